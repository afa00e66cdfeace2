//! Reply-draft generation
//!
//! One backend, one prompt per reply stance, all prompts in flight at once.
//! Results come back in prompt order; a failed prompt is dropped and only
//! an all-failed run is an error.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::ReplyConfig;
use crate::error::{GenerationError, Result};

use super::backend::{TextBackend, build_backend};
use super::shaping::{ShapeLimits, TransferEncoding, shape_content};
use super::types::GenerationParams;

const REPLY_PREAMBLE: &str =
    "Write a reply to the following email as if you are the recipient.";
const REPLY_POSTAMBLE: &str = "Do not introduce yourself or state your occupation unless the email specifically asks for it. Here is the email:";

/// Stance a reply draft takes towards the mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStance {
    Accept,
    Decline,
}

impl ReplyStance {
    /// Stances in option order (option 1 first)
    pub const ALL: [ReplyStance; 2] = [ReplyStance::Accept, ReplyStance::Decline];

    fn instruction(self) -> &'static str {
        match self {
            ReplyStance::Accept => {
                "Your reply should politely ACCEPT the offer, confirm your acceptance, and mention any next steps if appropriate."
            }
            ReplyStance::Decline => {
                "Your reply should politely REJECT the offer, express gratitude, and optionally provide a brief reason for declining."
            }
        }
    }

    /// Full prompt for this stance
    pub fn prompt(self, content: &str) -> String {
        format!(
            "{} {} {}\n{}",
            REPLY_PREAMBLE,
            self.instruction(),
            REPLY_POSTAMBLE,
            content
        )
    }
}

/// Reply drafts in prompt order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyOptions {
    pub options: Vec<String>,
}

impl ReplyOptions {
    /// Option by 1-based index, as presented to the user
    pub fn option(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// Capability used by the orchestrator to draft replies
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn generate_replies(
        &self,
        content: &str,
    ) -> std::result::Result<ReplyOptions, GenerationError>;
}

/// Single-backend reply generator
pub struct ReplyGenerator {
    backend: Arc<dyn TextBackend>,
    limits: ShapeLimits,
    params: GenerationParams,
}

impl ReplyGenerator {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self {
            backend,
            limits: ShapeLimits::default(),
            params: GenerationParams::default(),
        }
    }

    pub fn from_config(config: &ReplyConfig) -> Result<Self> {
        Ok(Self::new(build_backend(&config.backend, config.timeout())?))
    }

    /// Input limits; configured ones come from the `[summarizer]` section
    pub fn with_limits(mut self, limits: ShapeLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[async_trait]
impl ReplySource for ReplyGenerator {
    async fn generate_replies(
        &self,
        content: &str,
    ) -> std::result::Result<ReplyOptions, GenerationError> {
        let shaped = shape_content(content, TransferEncoding::Identity, self.limits)?;

        let requests = ReplyStance::ALL.iter().map(|stance| {
            let prompt = stance.prompt(&shaped.text);
            async move { (*stance, self.backend.generate(&prompt, &self.params).await) }
        });

        let mut options = Vec::with_capacity(ReplyStance::ALL.len());
        for (stance, outcome) in join_all(requests).await {
            match outcome {
                Ok(text) => {
                    debug!("Generated {:?} reply ({} chars)", stance, text.len());
                    options.push(text.trim().to_string());
                }
                Err(e) => warn!("Failed to generate {:?} reply: {}", stance, e),
            }
        }

        if options.is_empty() {
            error!("All reply prompts failed on {}", self.backend.name());
            return Err(GenerationError::AllFailed);
        }

        Ok(ReplyOptions { options })
    }
}
