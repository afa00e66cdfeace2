//! Text generation: backends, content shaping, summarization and replies
//!
//! Hugging Face inference models summarize, Gemini drafts replies. Both sit
//! behind [`TextBackend`] so strategies can be tested against fakes.

mod backend;
mod rate_limit;
mod replies;
mod shaping;
mod summarizer;
mod types;

pub use backend::{GeminiBackend, HuggingFaceBackend, TextBackend, build_backend};
pub use rate_limit::RequestThrottle;
pub use replies::{ReplyGenerator, ReplyOptions, ReplySource, ReplyStance};
pub use shaping::*;
pub use summarizer::{NO_SUMMARY_TEXT, Summarize, Summarizer, SummarizerOptions};
pub use types::*;
