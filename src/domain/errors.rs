use thiserror::Error;

/// Failures that terminate a query pipeline. Each variant maps to a stable error code
/// returned to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The query was empty, too long, or the request body could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No resource kind could be listed from the cluster.
    #[error("cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// The language-model backend exhausted its retry budget or rejected the request.
    #[error("language model backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A fault inside the service itself, such as a context that could not be encoded.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    pub fn cluster_unavailable(msg: impl Into<String>) -> Self {
        Self::ClusterUnavailable(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code used in error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidQuery(_) => "INVALID_QUERY",
            PipelineError::ClusterUnavailable(_) => "CLUSTER_UNAVAILABLE",
            PipelineError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            PipelineError::Internal(_) => "INTERNAL",
        }
    }

    /// True when the caller, not the service, caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidQuery(_))
    }
}

/// Errors raised by a cluster capability while listing one resource kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The credentials are valid but may not list this kind.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The kind is not served by this cluster (or absent from a fixture directory).
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or API-server failure.
    #[error("api unavailable: {0}")]
    Unavailable(String),

    /// The response could not be decoded as a resource list.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClusterError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Errors raised by a language-model capability for a single call.
///
/// The split between retryable and non-retryable variants drives the backoff controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend asked us to slow down (HTTP 429 or equivalent).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeouts, connection resets and server-side errors.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Malformed request, authentication failure, unknown model and similar.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited(_) | BackendError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(PipelineError::invalid_query("x").code(), "INVALID_QUERY");
        assert_eq!(
            PipelineError::cluster_unavailable("x").code(),
            "CLUSTER_UNAVAILABLE"
        );
        assert_eq!(
            PipelineError::backend_unavailable("x").code(),
            "BACKEND_UNAVAILABLE"
        );
        assert_eq!(PipelineError::internal("x").code(), "INTERNAL");
    }

    #[test]
    fn test_only_invalid_query_is_client_error() {
        assert!(PipelineError::invalid_query("x").is_client_error());
        assert!(!PipelineError::cluster_unavailable("x").is_client_error());
        assert!(!PipelineError::backend_unavailable("x").is_client_error());
        assert!(!PipelineError::internal("x").is_client_error());
    }

    #[test]
    fn test_backend_retry_classes() {
        assert!(BackendError::rate_limited("slow down").is_retryable());
        assert!(BackendError::transient("reset").is_retryable());
        assert!(!BackendError::rejected("bad key").is_retryable());
    }
}
