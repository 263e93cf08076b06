//! Shared OpenAI-compatible wire handling.
//!
//! Both the groq and qwen backends speak the same chat-completions dialect;
//! this module builds the request payload and normalizes the reply so the
//! adapters stay thin. Error envelopes are translated into a message string
//! plus HTTP-equivalent status, never echoing request headers.

use crate::llm::types::{
    BackendError, ChatRole, CompletionRequest, NormalizedCompletion, TokenUsage,
};
use serde::Deserialize;
use serde_json::json;

pub(crate) fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

/// Build a chat-completions payload from the normalized request shape.
pub(crate) fn chat_payload(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let mut messages: Vec<serde_json::Value> = request
        .history
        .iter()
        .map(|turn| json!({ "role": role_label(turn.role), "content": turn.content }))
        .collect();
    messages.push(json!({ "role": "user", "content": request.message }));
    json!({ "model": model, "messages": messages })
}

/// Map a transport-level failure (connect, timeout) into the uniform shape.
pub(crate) fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        return BackendError::CallFailed {
            status: None,
            message: "request timed out".to_string(),
        };
    }
    BackendError::CallFailed {
        status: error.status().map(|s| s.as_u16()),
        message: format!("transport failure: {}", error.without_url()),
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Extract the native error message from a failed reply body, falling back
/// to a truncated raw body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if let Some(detail) = envelope.error {
            return detail.message;
        }
    }
    let mut trimmed = body.trim().to_string();
    trimmed.truncate(200);
    trimmed
}

/// Normalize a chat-completions HTTP reply into a completion.
pub(crate) async fn parse_chat_reply(
    response: reqwest::Response,
    provider: &str,
) -> Result<NormalizedCompletion, BackendError> {
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
            message: error_message(&body),
        });
    }

    let reply: ChatReply = serde_json::from_str(&body)
        .map_err(|e| BackendError::MalformedReply(format!("chat reply: {}", e)))?;
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::MalformedReply("reply contained no choices".to_string()))?;

    Ok(NormalizedCompletion {
        text: choice.message.content,
        token_usage: reply.usage.map(|usage| TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        provider: provider.to_string(),
    })
}
