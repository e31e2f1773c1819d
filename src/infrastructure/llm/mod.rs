//! Language-model capability adapters.

mod openai;

pub use openai::{classify_status, OpenAiChatClient};
