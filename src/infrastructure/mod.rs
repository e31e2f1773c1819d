//! Infrastructure layer wiring concrete adapters (cluster access, language models).

pub mod cluster;
pub mod llm;

pub use cluster::{FixtureCluster, KubeApiClient, TlsOptions};
pub use llm::OpenAiChatClient;
