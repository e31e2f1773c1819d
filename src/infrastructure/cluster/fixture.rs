use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::application::services::ClusterApi;
use crate::domain::{ClusterError, ResourceKind, ResourceRecord};

/// Cluster capability backed by `kubectl get <kind> -A -o json` dumps.
///
/// Each kind is read from `<dir>/<plural>.json` (for example `pods.json`) on every call, so
/// edits show up on the next query. A missing file lists as `NotFound`.
pub struct FixtureCluster {
    dir: PathBuf,
}

impl FixtureCluster {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, kind: ResourceKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.plural()))
    }
}

impl ClusterApi for FixtureCluster {
    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceRecord>, ClusterError> {
        let path = self.file_for(kind);
        let bytes = fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ClusterError::not_found(format!("{} is missing", path.display())),
            _ => ClusterError::unavailable(format!("{}: {err}", path.display())),
        })?;
        let document: Value = serde_json::from_slice(&bytes)
            .map_err(|err| ClusterError::malformed(format!("{}: {err}", path.display())))?;

        let items = match document {
            Value::Array(items) => items,
            Value::Object(mut list) => match list.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ClusterError::malformed(format!(
                        "{} has no `items` array",
                        path.display()
                    )))
                }
            },
            _ => {
                return Err(ClusterError::malformed(format!(
                    "{} is not a resource list",
                    path.display()
                )))
            }
        };

        let scope = namespace.filter(|_| kind.is_namespaced());
        Ok(items
            .into_iter()
            .map(ResourceRecord::new)
            .filter(|record| scope.map_or(true, |ns| record.namespace() == Some(ns)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, file: &str, value: Value) {
        fs::write(dir.join(file), serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_reads_kubectl_list_and_scopes_namespace() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "pods.json",
            json!({
                "apiVersion": "v1",
                "kind": "List",
                "items": [
                    {"metadata": {"name": "web", "namespace": "shop"}},
                    {"metadata": {"name": "dns", "namespace": "kube-system"}}
                ]
            }),
        );
        let cluster = FixtureCluster::new(dir.path());

        assert_eq!(cluster.list(ResourceKind::Pod, None).unwrap().len(), 2);
        let scoped = cluster.list(ResourceKind::Pod, Some("shop")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name(), Some("web"));
    }

    #[test]
    fn test_cluster_scoped_kind_ignores_namespace() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "nodes.json",
            json!([{"metadata": {"name": "node-a"}}]),
        );

        let nodes = FixtureCluster::new(dir.path())
            .list(ResourceKind::Node, Some("shop"))
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("services.json"), b"{\"kind\": \"List\"}").unwrap();
        let cluster = FixtureCluster::new(dir.path());

        assert!(matches!(
            cluster.list(ResourceKind::Secret, None),
            Err(ClusterError::NotFound(_))
        ));
        assert!(matches!(
            cluster.list(ResourceKind::Service, None),
            Err(ClusterError::Malformed(_))
        ));
    }
}
