//! Contracts for the collaborators the pipeline calls out to.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    Answer, BackendError, ClusterError, KindSelection, PipelineError, RawResourceSet,
    ResourceKind, ResourceRecord,
};

/// Read-only access to cluster state.
pub trait ClusterApi: Send + Sync {
    /// List every object of `kind`, across all namespaces unless `namespace` is given.
    /// Cluster-scoped kinds ignore `namespace`.
    fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceRecord>, ClusterError>;
}

/// Single-turn prompt sent to a language model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Single-turn completion backend.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Blocks the current thread between backend attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration);
}

/// Sleeper backed by `std::thread::sleep`; the pipeline runs on blocking threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Receives structured events from each pipeline stage.
///
/// Every method has a no-op default so observers only implement what they need.
pub trait PipelineObserver: Send + Sync {
    fn query_received(&self, _query_id: Uuid, _query: &str) {}

    fn kinds_selected(&self, _query_id: Uuid, _selection: &KindSelection) {}

    fn collection_finished(&self, _query_id: Uuid, _snapshot: &RawResourceSet) {}

    fn context_filtered(&self, _query_id: Uuid, _records: usize, _bytes: usize) {}

    fn backend_retry(&self, _operation: &str, _attempt: u32, _delay: Duration, _error: &BackendError) {}

    fn answered(&self, _query_id: Uuid, _answer: &Answer) {}

    fn failed(&self, _query_id: Uuid, _error: &PipelineError) {}
}

/// Observer that forwards pipeline events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn query_received(&self, query_id: Uuid, query: &str) {
        info!(target: "kubequery::pipeline", %query_id, query, "query received");
    }

    fn kinds_selected(&self, query_id: Uuid, selection: &KindSelection) {
        let kinds: Vec<&str> = selection.kinds().iter().map(ResourceKind::as_str).collect();
        info!(
            target: "kubequery::pipeline",
            %query_id,
            kinds = ?kinds,
            namespace = selection.namespace().unwrap_or("*"),
            fallback = selection.is_fallback(),
            "kinds selected"
        );
    }

    fn collection_finished(&self, query_id: Uuid, snapshot: &RawResourceSet) {
        for (kind, error) in snapshot.failures() {
            warn!(target: "kubequery::pipeline", %query_id, kind = %kind, %error, "kind not collected");
        }
        info!(
            target: "kubequery::pipeline",
            %query_id,
            collected = snapshot.collected_kinds().len(),
            failed = snapshot.failures().len(),
            records = snapshot.total_records(),
            "collection finished"
        );
    }

    fn context_filtered(&self, query_id: Uuid, records: usize, bytes: usize) {
        info!(target: "kubequery::pipeline", %query_id, records, context_bytes = bytes, "context filtered");
    }

    fn backend_retry(&self, operation: &str, attempt: u32, delay: Duration, error: &BackendError) {
        debug!(
            target: "kubequery::backoff",
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            %error,
            "retrying language model call"
        );
    }

    fn answered(&self, query_id: Uuid, answer: &Answer) {
        info!(
            target: "kubequery::pipeline",
            %query_id,
            answer = %answer.text,
            grounding = ?answer.grounding,
            "answer generated"
        );
    }

    fn failed(&self, query_id: Uuid, error: &PipelineError) {
        warn!(target: "kubequery::pipeline", %query_id, code = error.code(), %error, "query failed");
    }
}
