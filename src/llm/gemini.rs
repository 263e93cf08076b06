//! Gemini adapter.
//!
//! Speaks the `generateContent` dialect of the Generative Language API. The
//! API key travels in the `x-goog-api-key` header so it can never leak
//! through an error message that echoes the request URL.

use crate::llm::backend::{Backend, BackendSettings};
use crate::llm::openai_wire;
use crate::llm::types::{
    BackendError, ChatRole, CompletionRequest, NormalizedCompletion, TokenUsage,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let api_key = settings
            .gemini_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BackendError::Unavailable("gemini credentials are not configured".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: settings
                .gemini_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    fn payload(request: &CompletionRequest) -> serde_json::Value {
        // Gemini has no system role in contents; system turns are folded
        // into user turns, assistant turns become "model".
        let mut contents: Vec<serde_json::Value> = request
            .history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::Assistant => "model",
                    ChatRole::User | ChatRole::System => "user",
                };
                json!({ "role": role, "parts": [{ "text": turn.content }] })
            })
            .collect();
        contents.push(json!({ "role": "user", "parts": [{ "text": request.message }] }));
        json!({ "contents": contents })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

impl Backend for GeminiBackend {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<NormalizedCompletion, BackendError>> {
        Box::pin(async move {
            let endpoint = format!("{}/{}:generateContent", API_BASE, self.model);
            let response = self
                .client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&Self::payload(&request))
                .send()
                .await
                .map_err(openai_wire::transport_error)?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| BackendError::CallFailed {
                    status: Some(status.as_u16()),
                    message: format!("reading reply body: {}", e.without_url()),
                })?;

            if !status.is_success() {
                return Err(BackendError::CallFailed {
                    status: Some(status.as_u16()),
                    message: openai_wire::error_message(&body),
                });
            }

            let reply: GenerateReply = serde_json::from_str(&body)
                .map_err(|e| BackendError::MalformedReply(format!("generateContent: {}", e)))?;
            let text = reply
                .candidates
                .unwrap_or_default()
                .into_iter()
                .next()
                .map(|candidate| {
                    candidate
                        .content
                        .parts
                        .into_iter()
                        .filter_map(|part| part.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .filter(|text| !text.is_empty())
                .ok_or_else(|| {
                    BackendError::MalformedReply("reply contained no candidates".to_string())
                })?;

            Ok(NormalizedCompletion {
                text,
                token_usage: reply.usage_metadata.map(|usage| TokenUsage {
                    input_tokens: usage.prompt_token_count,
                    output_tokens: usage.candidates_token_count,
                    total_tokens: usage.total_token_count,
                }),
                provider: "gemini".to_string(),
            })
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
