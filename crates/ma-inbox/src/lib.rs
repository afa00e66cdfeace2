//! ma-inbox: mailbox state and enrichment for mail-assist
//!
//! [`Orchestrator`] loads a selection through a mail source, publishes it as
//! [`MailboxState`] and merges summaries into it as they arrive.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{GENERATION_PROBE, LoadSettings, Orchestrator};
pub use state::{EnrichmentStage, MailboxState};
