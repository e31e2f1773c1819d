//! Domain layer: query, resource catalog, snapshots and answers for kubequery.

pub mod errors;
pub mod models;

pub use errors::{BackendError, ClusterError, PipelineError};
pub use models::{
    Answer, FilteredContext, Grounding, KindContext, KindSelection, ProjectedRecord, Query,
    RawResourceSet, ResourceKind, ResourceRecord, UnknownKind,
};
