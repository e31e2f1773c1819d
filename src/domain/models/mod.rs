use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::errors::{ClusterError, PipelineError};

/// Upper bound on query length, counted in characters after trimming.
pub const MAX_QUERY_CHARS: usize = 2_000;

/// A validated, trimmed natural-language question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::invalid_query("query cannot be empty"));
        }
        if trimmed.chars().count() > MAX_QUERY_CHARS {
            return Err(PipelineError::invalid_query(format!(
                "query cannot exceed {} characters",
                MAX_QUERY_CHARS
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed catalog of cluster object categories the pipeline may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Namespace,
    Node,
    Pod,
    Deployment,
    Service,
    PersistentVolume,
    PersistentVolumeClaim,
    Secret,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Namespace,
        ResourceKind::Node,
        ResourceKind::Pod,
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::PersistentVolume,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Secret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Node => "node",
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::PersistentVolume => "persistent-volume",
            ResourceKind::PersistentVolumeClaim => "persistent-volume-claim",
            ResourceKind::Secret => "secret",
        }
    }

    /// Lower-case plural used by the Kubernetes REST API.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::Node => "nodes",
            ResourceKind::Pod => "pods",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::PersistentVolume => "persistentvolumes",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
            ResourceKind::Secret => "secrets",
        }
    }

    /// REST prefix of the API group serving this kind.
    pub fn api_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "/apis/apps/v1",
            _ => "/api/v1",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            ResourceKind::Namespace | ResourceKind::Node | ResourceKind::PersistentVolume
        )
    }

    /// Short human description used in the selector instruction.
    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces and their phase",
            ResourceKind::Node => "cluster nodes, readiness, roles and kubelet version",
            ResourceKind::Pod => "pods with namespace and phase (Running, Pending, ...)",
            ResourceKind::Deployment => "deployments with replica counts and container images",
            ResourceKind::Service => "services with type, cluster IP and ports",
            ResourceKind::PersistentVolume => "persistent volumes with capacity and claim",
            ResourceKind::PersistentVolumeClaim => {
                "persistent volume claims with status, capacity and bound volume"
            }
            ResourceKind::Secret => "secret names and types (never their values)",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a string does not name a catalog kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown resource kind `{0}`")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace(['_', ' '], "-");
        let kind = match normalized.as_str() {
            "namespace" | "namespaces" | "ns" => ResourceKind::Namespace,
            "node" | "nodes" | "no" => ResourceKind::Node,
            "pod" | "pods" | "po" => ResourceKind::Pod,
            "deployment" | "deployments" | "deploy" | "deploys" => ResourceKind::Deployment,
            "service" | "services" | "svc" => ResourceKind::Service,
            "persistent-volume" | "persistent-volumes" | "persistentvolume"
            | "persistentvolumes" | "pv" | "pvs" => ResourceKind::PersistentVolume,
            "persistent-volume-claim"
            | "persistent-volume-claims"
            | "persistentvolumeclaim"
            | "persistentvolumeclaims"
            | "pvc"
            | "pvcs" => ResourceKind::PersistentVolumeClaim,
            "secret" | "secrets" => ResourceKind::Secret,
            _ => return Err(UnknownKind(raw.trim().to_string())),
        };
        Ok(kind)
    }
}

/// The kinds (and optional namespace scope) chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSelection {
    kinds: BTreeSet<ResourceKind>,
    namespace: Option<String>,
    fallback: bool,
}

impl KindSelection {
    /// Every catalog kind, chosen deliberately for a broad question.
    pub fn all() -> Self {
        Self {
            kinds: ResourceKind::ALL.into_iter().collect(),
            namespace: None,
            fallback: false,
        }
    }

    /// Maximal-recall selection used when the classifier output is unusable.
    pub fn fallback() -> Self {
        Self {
            fallback: true,
            ..Self::all()
        }
    }

    /// Build a selection from parsed kinds; an empty set degrades to [`KindSelection::fallback`].
    pub fn of(kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        let kinds: BTreeSet<ResourceKind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Self::fallback();
        }
        Self {
            kinds,
            namespace: None,
            fallback: false,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn kinds(&self) -> &BTreeSet<ResourceKind> {
        &self.kinds
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// One Kubernetes object as returned by the cluster capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRecord(Value);

impl ResourceRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn name(&self) -> Option<&str> {
        self.field(&["metadata", "name"]).and_then(Value::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.field(&["metadata", "namespace"]).and_then(Value::as_str)
    }

    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.0, |current, segment| current.get(*segment))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Fresh per-query snapshot: listed records per kind plus the kinds that failed to list.
#[derive(Debug, Clone, Default)]
pub struct RawResourceSet {
    namespace: Option<String>,
    resources: BTreeMap<ResourceKind, Vec<ResourceRecord>>,
    failures: BTreeMap<ResourceKind, ClusterError>,
}

impl RawResourceSet {
    pub fn from_parts(
        namespace: Option<String>,
        resources: BTreeMap<ResourceKind, Vec<ResourceRecord>>,
        failures: BTreeMap<ResourceKind, ClusterError>,
    ) -> Self {
        Self {
            namespace,
            resources,
            failures,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn records(&self, kind: ResourceKind) -> &[ResourceRecord] {
        self.resources
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Kinds that were listed successfully, in catalog order.
    pub fn collected_kinds(&self) -> Vec<ResourceKind> {
        self.resources.keys().copied().collect()
    }

    pub fn failures(&self) -> &BTreeMap<ResourceKind, ClusterError> {
        &self.failures
    }

    pub fn total_records(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Projection of a single record: retained field name to value.
pub type ProjectedRecord = Map<String, Value>;

/// Reduced records of one kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindContext {
    /// Records listed before size bounding.
    pub total: usize,
    /// Records dropped to keep the context within budget.
    #[serde(skip_serializing_if = "is_zero")]
    pub omitted: usize,
    /// Every listed record tallied by status (phase, or readiness for nodes), omitted ones
    /// included. Empty for kinds without a status field.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub status_counts: BTreeMap<String, usize>,
    pub items: Vec<ProjectedRecord>,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Compact, size-bounded view of a snapshot handed to the answer synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilteredContext {
    kinds: BTreeMap<ResourceKind, KindContext>,
}

impl FilteredContext {
    pub fn new(kinds: BTreeMap<ResourceKind, KindContext>) -> Self {
        Self { kinds }
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&KindContext> {
        self.kinds.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = (&ResourceKind, &KindContext)> {
        self.kinds.iter()
    }

    pub fn record_count(&self) -> usize {
        self.kinds.values().map(|ctx| ctx.items.len()).sum()
    }

    /// Records listed across all kinds, before size bounding.
    pub fn listed_count(&self) -> usize {
        self.kinds.values().map(|ctx| ctx.total).sum()
    }

    /// True when the cluster listed no record of any selected kind, including when no kind
    /// was collected. A context truncated down to zero items still has records.
    pub fn has_no_records(&self) -> bool {
        self.listed_count() == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// How an answer relates to the context it was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    Grounded,
    InsufficientContext,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub grounding: Grounding,
}

impl Answer {
    pub fn new(text: impl Into<String>, grounding: Grounding) -> Self {
        Self {
            text: text.into(),
            grounding,
        }
    }
}
