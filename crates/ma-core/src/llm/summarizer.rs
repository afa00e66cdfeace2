//! Message summarization over an ordered list of backends
//!
//! Two strategies share one backend list and one request throttle:
//!
//! - [`Summarizer::summarize_with_retry`] retries the current backend with
//!   increasing delays, and permanently demotes it to the next backend on
//!   exhausted 503s or any other API error.
//! - [`Summarizer::summarize_with_fallback`] makes one validated attempt per
//!   backend, in order, without touching the demotion state.
//!
//! Both return plain text. Terminal failures are sentinel strings starting
//! with [`ERROR_MARKER`](super::shaping::ERROR_MARKER).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::{SummarizerConfig, SummaryMode};
use crate::error::{Error, GenerationError, Result};

use super::backend::{TextBackend, build_backend};
use super::rate_limit::RequestThrottle;
use super::shaping::*;
use super::types::GenerationParams;

/// Returned by the fallback strategy when the mail has no usable prose.
pub const NO_SUMMARY_TEXT: &str = "No summary available for this email.";

/// Summaries shorter than this are rejected as low quality.
const MIN_SUMMARY_CHARS: usize = 20;

/// Content shorter than this is its own summary in the fallback strategy.
const VERBATIM_BELOW_CHARS: usize = 50;

/// Content with fewer letters/digits than this is not worth summarizing.
const MIN_ALNUM_CHARS: usize = 20;

/// Capability used by the orchestrator: turn mail content into a summary
/// or a sentinel failure string.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, content: &str) -> String;
}

/// Tunables of a [`Summarizer`]
#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    pub mode: SummaryMode,
    /// Delay before retry n; the length is the retry budget
    pub retry_delays: Vec<Duration>,
    pub min_request_interval: Duration,
    pub limits: ShapeLimits,
    pub params: GenerationParams,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            mode: SummaryMode::Retrying,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
            min_request_interval: Duration::from_millis(1000),
            limits: ShapeLimits::default(),
            params: GenerationParams::default(),
        }
    }
}

impl From<&SummarizerConfig> for SummarizerOptions {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            mode: config.mode,
            retry_delays: config.retry_delays(),
            min_request_interval: config.min_request_interval(),
            limits: ShapeLimits::from(config),
            params: GenerationParams::default(),
        }
    }
}

impl From<&SummarizerConfig> for ShapeLimits {
    fn from(config: &SummarizerConfig) -> Self {
        Self {
            min_chars: config.min_input_chars,
            max_chars: config.max_input_chars,
        }
    }
}

/// Multi-backend summarizer with retry, demotion and throttling
pub struct Summarizer {
    backends: Vec<Arc<dyn TextBackend>>,
    /// Index of the current backend; only ever moves forward
    current: Mutex<usize>,
    throttle: RequestThrottle,
    options: SummarizerOptions,
}

impl Summarizer {
    /// Create a summarizer over backends in demotion order
    pub fn new(backends: Vec<Arc<dyn TextBackend>>, options: SummarizerOptions) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Generation(GenerationError::NoBackends));
        }

        info!(
            "Summarizer ready with {} backends: {:?}",
            backends.len(),
            backends.iter().map(|b| b.name()).collect::<Vec<_>>()
        );

        Ok(Self {
            backends,
            current: Mutex::new(0),
            throttle: RequestThrottle::new(options.min_request_interval),
            options,
        })
    }

    /// Build backends and options from configuration
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let backends = config
            .backends
            .iter()
            .map(|b| build_backend(b, config.timeout()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(backends, SummarizerOptions::from(config))
    }

    /// Number of retries allowed per backend before giving up on it
    pub fn retry_budget(&self) -> usize {
        self.options.retry_delays.len()
    }

    /// Name of the backend the retrying strategy currently uses
    pub fn current_backend(&self) -> &str {
        self.backends[self.current_index()].name()
    }

    pub fn mode(&self) -> SummaryMode {
        self.options.mode
    }

    fn current_index(&self) -> usize {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move past `from` if it is still current. Returns false when there is
    /// no backend left to move to.
    fn demote(&self, from: usize) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if *current > from {
            return true;
        }
        if from + 1 < self.backends.len() {
            *current = from + 1;
            info!(
                "Switching from {} to {}",
                self.backends[from].name(),
                self.backends[from + 1].name()
            );
            true
        } else {
            false
        }
    }

    fn shape(&self, content: &str, encoding: TransferEncoding) -> std::result::Result<ShapedContent, String> {
        let shaped = shape_content(content, encoding, self.options.limits).map_err(|e| {
            error!("Rejected content before summarization: {}", e);
            shaping_error_text(&e)
        })?;

        debug!(
            "Content formatted: original {} chars, shaped {} chars, truncated={}",
            content.chars().count(),
            shaped.text.chars().count(),
            shaped.truncated
        );

        Ok(shaped)
    }

    /// Retrying strategy: backoff on transport errors and 503s, demotion on
    /// exhausted 503s and other API errors.
    pub async fn summarize_with_retry(&self, content: &str, encoding: TransferEncoding) -> String {
        let shaped = match self.shape(content, encoding) {
            Ok(shaped) => shaped,
            Err(sentinel) => return sentinel,
        };
        let prompt = summary_prompt(&shaped);
        let budget = self.retry_budget();
        let mut retries = 0usize;

        loop {
            let index = self.current_index();
            let backend = &self.backends[index];

            self.throttle.acquire().await;
            let outcome = backend.generate(&prompt, &self.options.params).await;

            match outcome {
                Ok(text) => return finish_summary(&text),
                Err(GenerationError::Transport(e)) => {
                    if retries < budget {
                        let delay = self.options.retry_delays[retries];
                        retries += 1;
                        warn!(
                            backend = backend.name(),
                            attempt = retries,
                            "Transport failure ({}), retrying in {:?}",
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    error!(backend = backend.name(), "Giving up after transport failures: {}", e);
                    return error_text(format!("Network issue after {} attempts", budget));
                }
                Err(GenerationError::ServiceUnavailable) => {
                    if retries < budget {
                        let delay = self.options.retry_delays[retries];
                        retries += 1;
                        warn!(
                            backend = backend.name(),
                            attempt = retries,
                            "Service unavailable, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if self.demote(index) {
                        retries = 0;
                        continue;
                    }
                    return error_text("Service unavailable after all attempts");
                }
                Err(GenerationError::Status { status, body }) => {
                    warn!(backend = backend.name(), status, "API error: {}", body);
                    if self.demote(index) {
                        retries = 0;
                        continue;
                    }
                    return error_text(format!("API error {}", status));
                }
                Err(other) => {
                    error!(backend = backend.name(), "Error parsing response: {}", other);
                    return error_text("Invalid response format");
                }
            }
        }
    }

    /// Fallback strategy: one attempt per backend, first valid text wins.
    pub async fn summarize_with_fallback(&self, content: &str, encoding: TransferEncoding) -> String {
        let shaped = match self.shape(content, encoding) {
            Ok(shaped) => shaped,
            Err(sentinel) => return sentinel,
        };

        if shaped.text.chars().filter(|c| c.is_alphanumeric()).count() < MIN_ALNUM_CHARS {
            return NO_SUMMARY_TEXT.to_string();
        }
        if shaped.text.chars().count() < VERBATIM_BELOW_CHARS {
            return shaped.text;
        }

        let prompt = summary_prompt(&shaped);

        for backend in &self.backends {
            self.throttle.acquire().await;
            match backend.generate(&prompt, &self.options.params).await {
                Ok(text) => {
                    let text = text.trim();
                    if is_valid_fallback_summary(text) {
                        return text.to_string();
                    }
                    warn!(backend = backend.name(), "Rejected summary, trying next model");
                }
                Err(e) => {
                    warn!(backend = backend.name(), "Model failed: {}", e);
                }
            }
        }

        error_text("Could not generate summary with any model.")
    }
}

#[async_trait]
impl Summarize for Summarizer {
    async fn summarize(&self, content: &str) -> String {
        match self.options.mode {
            SummaryMode::Retrying => {
                self.summarize_with_retry(content, TransferEncoding::Identity)
                    .await
            }
            SummaryMode::Fallback => {
                self.summarize_with_fallback(content, TransferEncoding::Identity)
                    .await
            }
        }
    }
}

fn finish_summary(text: &str) -> String {
    let summary = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if summary.chars().count() < MIN_SUMMARY_CHARS {
        error!("Low quality summary generated: {:?}", summary);
        return error_text("Could not generate meaningful summary");
    }
    debug!("Generated summary ({} chars)", summary.chars().count());
    summary
}

/// Non-empty, not a sentinel, and not the instruction echoed back.
fn is_valid_fallback_summary(text: &str) -> bool {
    let echo_marker = "summarize the following email";
    !text.is_empty() && !is_error_text(text) && !text.to_lowercase().contains(echo_marker)
}
