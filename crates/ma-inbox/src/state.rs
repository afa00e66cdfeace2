//! Observable mailbox state

use std::collections::HashMap;

use serde::Serialize;

use ma_email::{MailboxFolder, Message, MessageKey};

/// Summarization progress of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStage {
    Pending,
    Summarizing,
    Summarized,
    Failed,
}

/// State observed by the UI. Only the orchestrator writes it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MailboxState {
    /// Selection order: unread first, then read filler, each newest first
    pub messages: Vec<Message>,
    pub folders: Vec<MailboxFolder>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub status_text: String,
    /// Generation of the load that produced `messages`
    pub version: u64,
    #[serde(skip)]
    pub enrichment: HashMap<MessageKey, EnrichmentStage>,
}

impl MailboxState {
    pub fn message(&self, key: &MessageKey) -> Option<&Message> {
        self.messages.iter().find(|m| &m.key == key)
    }

    pub fn stage(&self, key: &MessageKey) -> Option<EnrichmentStage> {
        self.enrichment.get(key).copied()
    }

    pub fn summarized_count(&self) -> usize {
        self.enrichment
            .values()
            .filter(|s| **s == EnrichmentStage::Summarized)
            .count()
    }

    /// Start an operation: loading, error cleared, status set
    pub(crate) fn begin(&mut self, status: impl Into<String>) {
        self.is_loading = true;
        self.error = None;
        self.status_text = status.into();
    }

    /// Finish an operation with an error
    pub(crate) fn fail(&mut self, error: impl Into<String>, status: impl Into<String>) {
        self.is_loading = false;
        self.error = Some(error.into());
        self.status_text = status.into();
    }

    pub(crate) fn finish(&mut self, status: impl Into<String>) {
        self.is_loading = false;
        self.status_text = status.into();
    }

    /// Replace the message list wholesale for a new load generation
    pub(crate) fn replace_messages(&mut self, messages: Vec<Message>, version: u64) {
        self.enrichment.clear();
        self.messages = messages;
        self.version = version;
    }

    /// Write a summary into the message with this identity. Returns false
    /// when no such message is loaded; nothing else is touched.
    pub(crate) fn merge_summary(&mut self, key: &MessageKey, summary: String) -> bool {
        match self.messages.iter_mut().find(|m| &m.key == key) {
            Some(message) => {
                message.summary = Some(summary);
                self.enrichment
                    .insert(key.clone(), EnrichmentStage::Summarized);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_stage(&mut self, key: &MessageKey, stage: EnrichmentStage) {
        if self.messages.iter().any(|m| &m.key == key) {
            self.enrichment.insert(key.clone(), stage);
        }
    }
}
