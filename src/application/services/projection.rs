//! Per-kind projection of raw cluster objects into a compact, size-bounded context.
//!
//! Every kind has a fixed allow-list of fields. Nothing outside that list reaches the
//! language model; in particular secret payloads (`data`, `stringData`) and annotations,
//! which may embed them via `last-applied-configuration`, are never projected.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{
    FilteredContext, KindContext, ProjectedRecord, RawResourceSet, ResourceKind, ResourceRecord,
};

/// Default upper bound on the serialized context, in bytes.
pub const DEFAULT_MAX_CONTEXT_BYTES: usize = 48_000;

#[derive(Clone, Copy)]
enum Extract {
    Path(&'static [&'static str]),
    Derived(fn(&ResourceRecord) -> Option<Value>),
}

/// One retained field of a projection schema.
#[derive(Clone, Copy)]
pub struct ProjectedField {
    pub name: &'static str,
    extract: Extract,
}

const fn path(name: &'static str, path: &'static [&'static str]) -> ProjectedField {
    ProjectedField {
        name,
        extract: Extract::Path(path),
    }
}

const fn derived(name: &'static str, f: fn(&ResourceRecord) -> Option<Value>) -> ProjectedField {
    ProjectedField {
        name,
        extract: Extract::Derived(f),
    }
}

const NAME: ProjectedField = path("name", &["metadata", "name"]);
const NAMESPACE: ProjectedField = path("namespace", &["metadata", "namespace"]);

const NAMESPACE_FIELDS: &[ProjectedField] = &[NAME, path("phase", &["status", "phase"])];

const NODE_FIELDS: &[ProjectedField] = &[
    NAME,
    derived("ready", node_ready),
    derived("roles", node_roles),
    path("kubelet_version", &["status", "nodeInfo", "kubeletVersion"]),
];

const POD_FIELDS: &[ProjectedField] = &[NAME, NAMESPACE, path("phase", &["status", "phase"])];

const DEPLOYMENT_FIELDS: &[ProjectedField] = &[
    NAME,
    NAMESPACE,
    path("replicas", &["spec", "replicas"]),
    path("ready_replicas", &["status", "readyReplicas"]),
    path("available_replicas", &["status", "availableReplicas"]),
    derived("images", deployment_images),
];

const SERVICE_FIELDS: &[ProjectedField] = &[
    NAME,
    NAMESPACE,
    path("type", &["spec", "type"]),
    path("cluster_ip", &["spec", "clusterIP"]),
    derived("ports", service_ports),
];

const PERSISTENT_VOLUME_FIELDS: &[ProjectedField] = &[
    NAME,
    path("phase", &["status", "phase"]),
    path("capacity", &["spec", "capacity", "storage"]),
    path("storage_class", &["spec", "storageClassName"]),
    derived("claim", volume_claim),
];

const PERSISTENT_VOLUME_CLAIM_FIELDS: &[ProjectedField] = &[
    NAME,
    NAMESPACE,
    path("phase", &["status", "phase"]),
    path("capacity", &["status", "capacity", "storage"]),
    path("storage_class", &["spec", "storageClassName"]),
    path("volume", &["spec", "volumeName"]),
];

const SECRET_FIELDS: &[ProjectedField] = &[NAME, NAMESPACE, path("type", &["type"])];

/// The fixed projection schema of `kind`.
pub fn schema(kind: ResourceKind) -> &'static [ProjectedField] {
    match kind {
        ResourceKind::Namespace => NAMESPACE_FIELDS,
        ResourceKind::Node => NODE_FIELDS,
        ResourceKind::Pod => POD_FIELDS,
        ResourceKind::Deployment => DEPLOYMENT_FIELDS,
        ResourceKind::Service => SERVICE_FIELDS,
        ResourceKind::PersistentVolume => PERSISTENT_VOLUME_FIELDS,
        ResourceKind::PersistentVolumeClaim => PERSISTENT_VOLUME_CLAIM_FIELDS,
        ResourceKind::Secret => SECRET_FIELDS,
    }
}

/// Projected field whose values are tallied over every record of `kind`, so counts survive
/// truncation.
pub fn status_field(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Namespace
        | ResourceKind::Pod
        | ResourceKind::PersistentVolume
        | ResourceKind::PersistentVolumeClaim => Some("phase"),
        ResourceKind::Node => Some("ready"),
        ResourceKind::Deployment | ResourceKind::Service | ResourceKind::Secret => None,
    }
}

/// Tally `records` by the status field of `kind`. Records without a value count as `Unknown`.
pub fn status_counts(kind: ResourceKind, records: &[ProjectedRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    let Some(field) = status_field(kind) else {
        return counts;
    };
    for record in records {
        let status = record
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

/// Names of the fields retained for `kind`, in schema order.
pub fn field_names(kind: ResourceKind) -> Vec<&'static str> {
    schema(kind).iter().map(|field| field.name).collect()
}

/// Apply the schema of `kind` to one record. Missing and null fields are left out.
pub fn project_record(kind: ResourceKind, record: &ResourceRecord) -> ProjectedRecord {
    let mut projected = ProjectedRecord::new();
    for field in schema(kind) {
        let value = match field.extract {
            Extract::Path(path) => record.field(path).cloned(),
            Extract::Derived(f) => f(record),
        };
        if let Some(value) = value.filter(|v| !v.is_null()) {
            projected.insert(field.name.to_string(), value);
        }
    }
    projected
}

/// Pure, deterministic reduction of a snapshot to its projected context.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionFilter {
    max_bytes: usize,
}

impl Default for ProjectionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_BYTES)
    }
}

impl ProjectionFilter {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Project every record of `kinds` present in `snapshot`, then shrink a shared per-kind
    /// record cap by halves until the serialized context fits the byte budget. Totals and
    /// status tallies always describe the full listing.
    pub fn filter(&self, snapshot: &RawResourceSet, kinds: &[ResourceKind]) -> FilteredContext {
        let mut projected: BTreeMap<ResourceKind, Vec<ProjectedRecord>> = BTreeMap::new();
        for &kind in kinds {
            if !snapshot.collected_kinds().contains(&kind) {
                continue;
            }
            let mut records: Vec<&ResourceRecord> = snapshot.records(kind).iter().collect();
            records.sort_by(|a, b| {
                (a.namespace().unwrap_or_default(), a.name().unwrap_or_default())
                    .cmp(&(b.namespace().unwrap_or_default(), b.name().unwrap_or_default()))
            });
            projected.insert(
                kind,
                records
                    .into_iter()
                    .map(|record| project_record(kind, record))
                    .collect(),
            );
        }

        let counts: BTreeMap<ResourceKind, BTreeMap<String, usize>> = projected
            .iter()
            .map(|(&kind, records)| (kind, status_counts(kind, records)))
            .collect();

        let mut cap = projected.values().map(Vec::len).max().unwrap_or(0);
        loop {
            let context = bounded(&projected, &counts, cap);
            if cap == 0 || serialized_len(&context) <= self.max_bytes {
                return context;
            }
            cap /= 2;
        }
    }
}

fn bounded(
    projected: &BTreeMap<ResourceKind, Vec<ProjectedRecord>>,
    counts: &BTreeMap<ResourceKind, BTreeMap<String, usize>>,
    cap: usize,
) -> FilteredContext {
    let kinds = projected
        .iter()
        .map(|(&kind, items)| {
            let kept: Vec<ProjectedRecord> = items.iter().take(cap).cloned().collect();
            let context = KindContext {
                total: items.len(),
                omitted: items.len() - kept.len(),
                status_counts: counts.get(&kind).cloned().unwrap_or_default(),
                items: kept,
            };
            (kind, context)
        })
        .collect();
    FilteredContext::new(kinds)
}

fn serialized_len(context: &FilteredContext) -> usize {
    context.to_json().map(|json| json.len()).unwrap_or(usize::MAX)
}

fn node_ready(record: &ResourceRecord) -> Option<Value> {
    let conditions = record.field(&["status", "conditions"])?.as_array()?;
    let ready = conditions
        .iter()
        .find(|condition| condition.get("type").and_then(Value::as_str) == Some("Ready"))?;
    let label = match ready.get("status").and_then(Value::as_str) {
        Some("True") => "Ready",
        Some("False") => "NotReady",
        _ => "Unknown",
    };
    Some(Value::String(label.into()))
}

fn node_roles(record: &ResourceRecord) -> Option<Value> {
    let labels = record.field(&["metadata", "labels"])?.as_object()?;
    let roles: Vec<Value> = labels
        .keys()
        .filter_map(|key| key.strip_prefix("node-role.kubernetes.io/"))
        .filter(|role| !role.is_empty())
        .map(|role| Value::String(role.to_string()))
        .collect();
    (!roles.is_empty()).then_some(Value::Array(roles))
}

fn deployment_images(record: &ResourceRecord) -> Option<Value> {
    let containers = record
        .field(&["spec", "template", "spec", "containers"])?
        .as_array()?;
    let images: Vec<Value> = containers
        .iter()
        .filter_map(|container| container.get("image").cloned())
        .collect();
    (!images.is_empty()).then_some(Value::Array(images))
}

fn service_ports(record: &ResourceRecord) -> Option<Value> {
    let ports = record.field(&["spec", "ports"])?.as_array()?;
    let rendered: Vec<Value> = ports
        .iter()
        .filter_map(|port| {
            let number = port.get("port")?.as_u64()?;
            let protocol = port
                .get("protocol")
                .and_then(Value::as_str)
                .unwrap_or("TCP");
            Some(Value::String(format!("{number}/{protocol}")))
        })
        .collect();
    (!rendered.is_empty()).then_some(Value::Array(rendered))
}

fn volume_claim(record: &ResourceRecord) -> Option<Value> {
    let name = record.field(&["spec", "claimRef", "name"])?.as_str()?;
    let claim = match record
        .field(&["spec", "claimRef", "namespace"])
        .and_then(Value::as_str)
    {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_string(),
    };
    Some(Value::String(claim))
}
