//! Groq adapter.
//!
//! Speaks the OpenAI-compatible chat-completions dialect at
//! `https://api.groq.com/openai/v1`.

use crate::llm::backend::{Backend, BackendSettings};
use crate::llm::openai_wire;
use crate::llm::types::{BackendError, CompletionRequest, NormalizedCompletion};
use futures::future::BoxFuture;

const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub struct GroqBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GroqBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let api_key = settings
            .groq_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BackendError::Unavailable("groq credentials are not configured".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: settings
                .groq_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

impl Backend for GroqBackend {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<NormalizedCompletion, BackendError>> {
        Box::pin(async move {
            let body = openai_wire::chat_payload(&self.model, &request);
            let response = self
                .client
                .post(DEFAULT_ENDPOINT)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(openai_wire::transport_error)?;
            openai_wire::parse_chat_reply(response, "groq").await
        })
    }

    fn name(&self) -> &str {
        "groq"
    }
}
