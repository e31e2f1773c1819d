use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::domain::{
    ClusterError, KindSelection, PipelineError, RawResourceSet, ResourceKind, ResourceRecord,
};

use super::capabilities::ClusterApi;

type ListOutcome = (ResourceKind, Result<Vec<ResourceRecord>, ClusterError>);

/// Takes a fresh snapshot of the selected kinds, one list call per kind.
pub struct ResourceCollector {
    cluster: Arc<dyn ClusterApi>,
}

impl ResourceCollector {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// List every selected kind in parallel. Kinds that fail are recorded on the snapshot;
    /// only a snapshot with no listed kind at all is an error.
    pub fn collect(&self, selection: &KindSelection) -> Result<RawResourceSet, PipelineError> {
        let namespace = selection.namespace();
        let cluster = &self.cluster;

        let outcomes: Vec<ListOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = selection
                .kinds()
                .iter()
                .map(|&kind| {
                    let scoped_ns = namespace.filter(|_| kind.is_namespaced());
                    (kind, scope.spawn(move || cluster.list(kind, scoped_ns)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(ClusterError::unavailable(format!(
                            "list call for {kind} panicked"
                        )))
                    });
                    (kind, result)
                })
                .collect()
        });

        let mut resources = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for (kind, result) in outcomes {
            match result {
                Ok(records) => {
                    resources.insert(kind, records);
                }
                Err(err) => {
                    failures.insert(kind, err);
                }
            }
        }

        if resources.is_empty() {
            let detail = failures
                .iter()
                .map(|(kind, err)| format!("{kind}: {err}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PipelineError::cluster_unavailable(format!(
                "no resource kind could be listed ({detail})"
            )));
        }

        Ok(RawResourceSet::from_parts(
            namespace.map(str::to_string),
            resources,
            failures,
        ))
    }
}
