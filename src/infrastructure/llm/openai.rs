use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::{CompletionRequest, LanguageModel};
use crate::domain::BackendError;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Language model reached through an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    endpoint: String,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

impl OpenAiChatClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            agent,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

impl LanguageModel for OpenAiChatClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .agent
            .post(&self.completions_url())
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(map_http_error)?;

        let reply: ChatResponse = response
            .into_json()
            .map_err(|err| BackendError::transient(format!("unreadable completion: {err}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::transient("completion carried no choices"))
    }
}

fn map_http_error(error: ureq::Error) -> BackendError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            classify_status(code, &body)
        }
        ureq::Error::Transport(transport) => BackendError::transient(transport.to_string()),
    }
}

/// Sort a non-2xx status into retryable and non-retryable failures.
pub fn classify_status(code: u16, body: &str) -> BackendError {
    let detail: String = body.chars().take(200).collect();
    let message = format!("HTTP {code}: {detail}");
    match code {
        429 => BackendError::rate_limited(message),
        408 | 500..=599 => BackendError::transient(message),
        _ => BackendError::rejected(message),
    }
}
