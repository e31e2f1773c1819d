//! In-process doubles for the pipeline's collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{
    Answer, BackendError, ClusterError, KindSelection, PipelineError, RawResourceSet,
    ResourceKind, ResourceRecord,
};

use super::capabilities::{ClusterApi, CompletionRequest, LanguageModel, PipelineObserver, Sleeper};

pub(crate) fn pod(namespace: &str, name: &str, phase: &str) -> ResourceRecord {
    ResourceRecord::new(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{name}"),
            "labels": {"app": name},
            "annotations": {"note": "internal"}
        },
        "spec": {
            "nodeName": "node-a",
            "containers": [{"name": "app", "image": "nginx:1.25"}]
        },
        "status": {"phase": phase, "podIP": "10.0.0.7"}
    }))
}

pub(crate) const SECRET_PAYLOAD: &str = "c3VwZXItc2VjcmV0LXBhc3N3b3Jk";

pub(crate) fn secret(namespace: &str, name: &str) -> ResourceRecord {
    ResourceRecord::new(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": {
                "kubectl.kubernetes.io/last-applied-configuration":
                    format!("{{\"data\":{{\"password\":\"{SECRET_PAYLOAD}\"}}}}")
            }
        },
        "type": "Opaque",
        "data": {"password": SECRET_PAYLOAD},
        "stringData": {"token": "plain-text-token"}
    }))
}

pub(crate) fn node(name: &str, ready: &str) -> ResourceRecord {
    ResourceRecord::new(json!({
        "kind": "Node",
        "metadata": {
            "name": name,
            "labels": {"node-role.kubernetes.io/control-plane": ""}
        },
        "status": {
            "conditions": [
                {"type": "MemoryPressure", "status": "False"},
                {"type": "Ready", "status": ready}
            ],
            "nodeInfo": {"kubeletVersion": "v1.30.2", "osImage": "Ubuntu"}
        }
    }))
}

/// Cluster double answering from canned per-kind results; unconfigured kinds list empty.
#[derive(Default)]
pub(crate) struct StaticCluster {
    results: BTreeMap<ResourceKind, Result<Vec<ResourceRecord>, ClusterError>>,
    calls: Mutex<Vec<(ResourceKind, Option<String>)>>,
}

impl StaticCluster {
    pub(crate) fn with_records(mut self, kind: ResourceKind, records: Vec<ResourceRecord>) -> Self {
        self.results.insert(kind, Ok(records));
        self
    }

    pub(crate) fn with_failure(mut self, kind: ResourceKind, error: ClusterError) -> Self {
        self.results.insert(kind, Err(error));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(ResourceKind, Option<String>)> {
        self.calls.lock().clone()
    }
}

impl ClusterApi for StaticCluster {
    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceRecord>, ClusterError> {
        self.calls.lock().push((kind, namespace.map(str::to_string)));
        self.results.get(&kind).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync>;

/// Model double that replays queued replies, then falls back to an optional responder.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub(crate) fn replying(replies: impl IntoIterator<Item = Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn with_responder(
        mut self,
        responder: impl Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.requests.lock().push(request.clone());
        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Err(BackendError::rejected("no scripted reply left")),
        }
    }
}

/// Stands in for a model that happily repeats any secret it is shown: replies with a secret
/// payload when one appears in the prompt, otherwise declares the context insufficient.
pub(crate) fn leaky_responder(request: &CompletionRequest) -> Result<String, BackendError> {
    for value in [SECRET_PAYLOAD, "plain-text-token"] {
        if request.user.contains(value) || request.system.contains(value) {
            return Ok(value.to_string());
        }
    }
    Ok("Insufficient information in the cluster data.".into())
}

#[derive(Default)]
pub(crate) struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
    }
}

/// Observer that keeps every event as a short string.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl PipelineObserver for RecordingObserver {
    fn query_received(&self, _query_id: Uuid, query: &str) {
        self.push(format!("received:{query}"));
    }

    fn kinds_selected(&self, _query_id: Uuid, selection: &KindSelection) {
        let kinds: Vec<&str> = selection.kinds().iter().map(ResourceKind::as_str).collect();
        self.push(format!("selected:{}", kinds.join(",")));
    }

    fn collection_finished(&self, _query_id: Uuid, snapshot: &RawResourceSet) {
        let failed: Vec<&str> = snapshot.failures().keys().map(ResourceKind::as_str).collect();
        self.push(format!("collected:failed={}", failed.join(",")));
    }

    fn context_filtered(&self, _query_id: Uuid, records: usize, bytes: usize) {
        self.push(format!("filtered:{records}:{bytes}"));
    }

    fn backend_retry(&self, operation: &str, attempt: u32, _delay: Duration, _error: &BackendError) {
        self.push(format!("retry:{operation}:{attempt}"));
    }

    fn answered(&self, _query_id: Uuid, answer: &Answer) {
        self.push(format!("answered:{}", answer.text));
    }

    fn failed(&self, _query_id: Uuid, error: &PipelineError) {
        self.push(format!("failed:{}", error.code()));
    }
}
