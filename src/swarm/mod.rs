//! Swarm coordination: parallel sampling with consensus reduction.
//!
//! A swarm run fans N completion calls out to one backend, scores every
//! sample with a deterministic heuristic, and reduces them to a single
//! consensus answer with a confidence score. Partial failures are tolerated
//! (failed samples are excluded from scoring, never retried individually);
//! only when every sample fails does the run raise
//! [`SwarmError::Exhausted`], at which point the caller falls back to a
//! single non-swarm call.

use crate::llm::{Backend, CompletionRequest};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounds and timeout for swarm runs
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Smallest permitted run size; smaller requests are raised to this
    pub min_size: usize,
    /// Largest permitted run size; larger requests are clamped to this
    pub max_size: usize,
    /// Shared per-sample timeout
    pub sample_timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 7,
            sample_timeout: Duration::from_secs(60),
        }
    }
}

/// One completed parallel sample
#[derive(Debug, Clone)]
pub struct SwarmSample {
    /// Position of the parallel call that produced this sample
    pub instance: usize,
    pub text: String,
    /// Heuristic quality in [0, 1]
    pub score: f64,
    pub latency: Duration,
}

/// The only artifact retained after a swarm call returns
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub response: String,
    /// Separation of the winner from the rest, in [0, 1]
    pub confidence: f64,
    pub samples: Vec<SwarmSample>,
}

impl ConsensusResult {
    pub fn best_score(&self) -> f64 {
        self.samples
            .iter()
            .map(|sample| sample.score)
            .fold(0.0, f64::max)
    }

    pub fn average_score(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|sample| sample.score).sum::<f64>() / self.samples.len() as f64
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SwarmError {
    /// Every parallel sample failed or timed out
    #[error("all {attempted} swarm samples failed")]
    Exhausted { attempted: usize },
}

/// Issues parallel completions against one backend and reduces them to a
/// consensus answer.
pub struct SwarmCoordinator {
    config: SwarmConfig,
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig) -> Self {
        Self { config }
    }

    /// Clamp a requested run size into the configured bounds.
    pub fn clamp_size(&self, requested: usize) -> usize {
        requested.clamp(self.config.min_size, self.config.max_size)
    }

    /// Run a swarm of the clamped size against `backend`.
    pub async fn run(
        &self,
        backend: Arc<dyn Backend>,
        request: &CompletionRequest,
        requested_size: usize,
    ) -> Result<ConsensusResult, SwarmError> {
        let size = self.clamp_size(requested_size);
        debug!(
            backend = backend.name(),
            requested_size, size, "starting swarm run"
        );

        let calls = (0..size).map(|instance| {
            let backend = Arc::clone(&backend);
            let request = request.clone();
            let timeout = self.config.sample_timeout;
            async move {
                let started = std::time::Instant::now();
                let outcome =
                    tokio::time::timeout(timeout, backend.complete(request)).await;
                (instance, started.elapsed(), outcome)
            }
        });

        let mut samples = Vec::new();
        for (instance, latency, outcome) in join_all(calls).await {
            match outcome {
                Ok(Ok(completion)) => {
                    let score = score_sample(&completion.text);
                    samples.push(SwarmSample {
                        instance,
                        text: completion.text,
                        score,
                        latency,
                    });
                }
                Ok(Err(error)) => {
                    warn!(instance, %error, "swarm sample failed");
                }
                Err(_) => {
                    warn!(instance, ?latency, "swarm sample timed out");
                }
            }
        }

        if samples.is_empty() {
            return Err(SwarmError::Exhausted { attempted: size });
        }

        let (winner, confidence) = consensus(&samples);
        info!(
            backend = backend.name(),
            size,
            survived = samples.len(),
            winner,
            confidence,
            "swarm run reduced to consensus"
        );
        Ok(ConsensusResult {
            response: samples[winner].text.clone(),
            confidence,
            samples,
        })
    }
}

/// Deterministic quality heuristic, normalized to [0, 1] by construction.
///
/// Fixed weights: a fenced code block 0.4, minimum length 0.2, a
/// return/definition token 0.2, at least three lines 0.2.
pub fn score_sample(text: &str) -> f64 {
    let mut score = 0.0;
    if text.contains("```") {
        score += 0.4;
    }
    if text.len() >= 50 {
        score += 0.2;
    }
    if text.contains("return ") || text.contains("fn ") || text.contains("def ") {
        score += 0.2;
    }
    if text.lines().count() >= 3 {
        score += 0.2;
    }
    score
}

/// Choose the winning sample and its confidence.
///
/// The highest score wins; exact ties resolve to the earliest-issued sample
/// so selection is stable. Confidence is the winner's separation from the
/// mean of the rest, floored at 0; a lone sample's confidence is its own
/// score.
fn consensus(samples: &[SwarmSample]) -> (usize, f64) {
    let mut winner = 0;
    for (index, sample) in samples.iter().enumerate() {
        if sample.score > samples[winner].score {
            winner = index;
        }
    }

    if samples.len() == 1 {
        return (winner, samples[winner].score.clamp(0.0, 1.0));
    }

    let rest_sum: f64 = samples
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != winner)
        .map(|(_, sample)| sample.score)
        .sum();
    let rest_mean = rest_sum / (samples.len() - 1) as f64;
    let confidence = (samples[winner].score - rest_mean).clamp(0.0, 1.0);
    (winner, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::BackendError;
    use crate::llm::{CallPurpose, CompletionRequest, ScriptedBackend, SessionContext};

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "write the function",
            SessionContext::new("tester", CallPurpose::Swarm),
        )
    }

    fn coordinator() -> SwarmCoordinator {
        SwarmCoordinator::new(SwarmConfig {
            sample_timeout: Duration::from_secs(2),
            ..Default::default()
        })
    }

    #[test]
    fn size_clamps_into_configured_range() {
        let swarm = coordinator();
        assert_eq!(swarm.clamp_size(10), 7);
        assert_eq!(swarm.clamp_size(1), 2);
        assert_eq!(swarm.clamp_size(4), 4);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        for text in [
            "",
            "short",
            "```rust\nfn add(a: u32, b: u32) -> u32 {\n    return a + b;\n}\n```",
        ] {
            let score = score_sample(text);
            assert!((0.0..=1.0).contains(&score), "score {score} for {text:?}");
        }
        assert_eq!(
            score_sample("```rust\nfn add(a: u32, b: u32) -> u32 {\n    return a + b;\n}\n```"),
            1.0
        );
    }

    #[tokio::test]
    async fn consensus_bounds_hold() {
        let swarm = coordinator();
        let backend = Arc::new(ScriptedBackend::new(
            "groq",
            vec![
                Ok("```rust\nfn a() {\n    return 1;\n}\n```".to_string()),
                Ok("maybe".to_string()),
                Ok("no code here".to_string()),
            ],
        ));
        let result = swarm.run(backend, &request(), 3).await.unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(result.best_score() >= result.average_score());
        assert!(result.response.contains("fn a()"));
    }

    #[tokio::test]
    async fn partial_failures_are_excluded_not_retried() {
        let swarm = coordinator();
        let backend = Arc::new(ScriptedBackend::new(
            "groq",
            vec![
                Err(BackendError::CallFailed {
                    status: Some(500),
                    message: "boom".to_string(),
                }),
                Ok("```\nreturn 2;\n```\nthree lines".to_string()),
            ],
        ));
        let result = swarm.run(Arc::clone(&backend) as _, &request(), 2).await.unwrap();
        assert_eq!(result.samples.len(), 1);
        // Two parallel calls, no individual retries.
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn all_failures_exhaust_the_swarm() {
        let swarm = coordinator();
        let backend = Arc::new(ScriptedBackend::failing(
            "groq",
            BackendError::CallFailed {
                status: Some(500),
                message: "boom".to_string(),
            },
        ));
        let error = swarm.run(backend, &request(), 3).await.unwrap_err();
        assert!(matches!(error, SwarmError::Exhausted { attempted: 3 }));
    }

    #[tokio::test]
    async fn tie_resolves_to_earliest_sample() {
        let swarm = coordinator();
        let backend = Arc::new(ScriptedBackend::new(
            "groq",
            vec![Ok("identical".to_string()), Ok("identical".to_string())],
        ));
        let result = swarm.run(backend, &request(), 2).await.unwrap();
        assert_eq!(result.response, "identical");
        assert_eq!(result.samples[0].instance, 0);
    }
}
