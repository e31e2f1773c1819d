//! Pipeline stages and the coordinator that runs them.

pub mod backoff;
pub mod capabilities;
pub mod collector;
pub mod projection;
mod query_service;
pub mod selector;
pub mod synthesizer;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::{BackoffController, BackoffPolicy};
pub use capabilities::{
    ClusterApi, CompletionRequest, LanguageModel, PipelineObserver, Sleeper, ThreadSleeper,
    TracingObserver,
};
pub use collector::ResourceCollector;
pub use projection::ProjectionFilter;
pub use query_service::{PipelineStage, QueryOutcome, QueryService, ServiceConfig};
pub use selector::ResourceSelector;
pub use synthesizer::AnswerSynthesizer;
