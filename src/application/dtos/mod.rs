use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::services::{projection, QueryOutcome};
use crate::domain::{Grounding, PipelineError, ResourceKind};

/// Body accepted by `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

/// Successful answer envelope. `query` and `answer` are the stable contract; the remaining
/// fields are diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub grounding: Grounding,
    pub query_id: Uuid,
    pub kinds: Vec<ResourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_kinds: Vec<ResourceKind>,
    pub answered_at: DateTime<Utc>,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            query: outcome.query,
            answer: outcome.answer.text,
            grounding: outcome.answer.grounding,
            query_id: outcome.query_id,
            kinds: outcome.selection.kinds().iter().copied().collect(),
            namespace: outcome.selection.namespace().map(str::to_string),
            failed_kinds: outcome.failed_kinds,
            answered_at: outcome.answered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

/// Liveness report for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub status: String,
    pub service: String,
}

impl HealthStatusResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".into(),
            service: "kubequery".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindDescriptor {
    pub id: ResourceKind,
    pub description: String,
    pub namespaced: bool,
    pub fields: Vec<String>,
}

impl From<ResourceKind> for KindDescriptor {
    fn from(kind: ResourceKind) -> Self {
        Self {
            id: kind,
            description: kind.description().to_string(),
            namespaced: kind.is_namespaced(),
            fields: projection::field_names(kind)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Catalog listing for `GET /api/kinds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindListResponse {
    pub kinds: Vec<KindDescriptor>,
}

impl KindListResponse {
    pub fn catalog() -> Self {
        Self {
            kinds: ResourceKind::ALL.into_iter().map(KindDescriptor::from).collect(),
        }
    }
}
