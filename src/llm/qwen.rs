//! Qwen adapter.
//!
//! Talks to a self-hosted OpenAI-compatible endpoint (the deployed qwen
//! devbox). Only the base URL is required; the endpoint itself handles
//! authentication inside the deployment boundary.

use crate::llm::backend::{Backend, BackendSettings};
use crate::llm::openai_wire;
use crate::llm::types::{BackendError, CompletionRequest, NormalizedCompletion};
use futures::future::BoxFuture;

const DEFAULT_MODEL: &str = "qwen2.5-coder-32b-instruct";

pub struct QwenBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl QwenBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let base = settings
            .qwen_base_url
            .clone()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                BackendError::Unavailable("qwen endpoint is not configured".to_string())
            })?;

        let endpoint = url::Url::parse(&base)
            .and_then(|base| base.join("v1/chat/completions"))
            .map_err(|e| BackendError::Unavailable(format!("qwen endpoint: {}", e)))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            model: settings
                .qwen_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

impl Backend for QwenBackend {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<NormalizedCompletion, BackendError>> {
        Box::pin(async move {
            let body = openai_wire::chat_payload(&self.model, &request);
            let response = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(openai_wire::transport_error)?;
            openai_wire::parse_chat_reply(response, "qwen").await
        })
    }

    fn name(&self) -> &str {
        "qwen"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_endpoint_fails_fast() {
        let settings = BackendSettings {
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let result = QwenBackend::new(&settings);
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn endpoint_joins_chat_completions_path() {
        let settings = BackendSettings {
            qwen_base_url: Some("http://10.0.0.7:8000/".to_string()),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let backend = QwenBackend::new(&settings).unwrap();
        assert_eq!(backend.endpoint, "http://10.0.0.7:8000/v1/chat/completions");
    }
}
