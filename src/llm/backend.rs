use crate::llm::types::{BackendError, CompletionRequest, NormalizedCompletion};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Generic AI backend that can produce a normalized completion from a prompt
/// plus history.
///
/// Adapters are polymorphic over this capability; callers never branch on
/// backend identity except to label output with [`Backend::name`].
pub trait Backend: Send + Sync {
    /// Execute a single completion request against the backend.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<NormalizedCompletion, BackendError>>;

    /// Backend family name; matches the provider descriptor it serves.
    fn name(&self) -> &str;
}

/// Connection settings shared by the adapter constructors.
///
/// Credentials are read from configuration or the environment; an adapter
/// whose credential is absent fails construction with
/// [`BackendError::Unavailable`] rather than failing mid-call.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub groq_api_key: Option<String>,
    pub groq_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub qwen_base_url: Option<String>,
    pub qwen_model: Option<String>,
    pub request_timeout: std::time::Duration,
}

impl BackendSettings {
    /// Populate unset credentials from the conventional environment variables.
    pub fn with_env_fallback(mut self) -> Self {
        self.groq_api_key = self.groq_api_key.or_else(|| std::env::var("GROQ_API_KEY").ok());
        self.gemini_api_key = self
            .gemini_api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok());
        self.qwen_base_url = self.qwen_base_url.or_else(|| std::env::var("QWEN_URL").ok());
        self
    }
}

/// Factory for creating backend adapters by family name
pub struct BackendFactory;

impl BackendFactory {
    pub fn create(name: &str, settings: &BackendSettings) -> Result<Arc<dyn Backend>, BackendError> {
        match name {
            "groq" => Ok(Arc::new(crate::llm::groq::GroqBackend::new(settings)?)),
            "gemini" => Ok(Arc::new(crate::llm::gemini::GeminiBackend::new(settings)?)),
            "qwen" => Ok(Arc::new(crate::llm::qwen::QwenBackend::new(settings)?)),
            other => Err(BackendError::Unavailable(format!(
                "unknown backend family '{}'",
                other
            ))),
        }
    }
}

/// Scripted backend for tests and offline runs.
///
/// Pops canned replies in order; when the script runs dry it repeats the
/// last entry. An `Err` entry reproduces a backend failure.
pub struct ScriptedBackend {
    name: String,
    replies: std::sync::Mutex<Vec<Result<String, BackendError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(
        name: impl Into<String>,
        replies: Vec<Result<String, BackendError>>,
    ) -> Self {
        Self {
            name: name.into(),
            replies: std::sync::Mutex::new(replies),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A backend that always succeeds with the same text.
    pub fn always(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![Ok(text.into())])
    }

    /// A backend that always fails the same way.
    pub fn failing(name: impl Into<String>, error: BackendError) -> Self {
        Self::new(name, vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Backend for ScriptedBackend {
    fn complete(
        &self,
        _request: CompletionRequest,
    ) -> BoxFuture<'_, Result<NormalizedCompletion, BackendError>> {
        Box::pin(async move {
            let index = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let replies = self.replies.lock().expect("script lock");
            let reply = replies
                .get(index)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| {
                    Err(BackendError::Unavailable("empty script".to_string()))
                });
            reply.map(|text| NormalizedCompletion {
                text,
                token_usage: None,
                provider: self.name.clone(),
            })
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
