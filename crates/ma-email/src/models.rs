//! Mail data model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject used when a message has none
pub const NO_SUBJECT: &str = "(No subject)";

/// Message priority from the `X-Priority` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// `1 (Highest)` and `2` are high, `4` and `5 (Lowest)` are low
    pub fn from_header(value: &str) -> Self {
        match value.trim().chars().next() {
            Some('1') | Some('2') => Priority::High,
            Some('4') | Some('5') => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// Server-side identity of a message within a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageId {
    /// Stable across sessions while UIDVALIDITY holds
    Uid { validity: u32, uid: u32 },
    /// Sequence number; only valid within one session
    Seq { seq: u32 },
}

/// Identity used to merge enrichment results into loaded messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub folder: String,
    pub id: MessageId,
}

impl MessageKey {
    pub fn new(folder: impl Into<String>, uid_validity: Option<u32>, uid: Option<u32>, seq: u32) -> Self {
        let id = match (uid_validity, uid) {
            (Some(validity), Some(uid)) => MessageId::Uid { validity, uid },
            _ => MessageId::Seq { seq },
        };
        Self {
            folder: folder.into(),
            id,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            MessageId::Uid { validity, uid } => write!(f, "{}/{}:{}", self.folder, validity, uid),
            MessageId::Seq { seq } => write!(f, "{}#{}", self.folder, seq),
        }
    }
}

/// A loaded message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sequence number as sent by the server
    pub id: String,
    pub key: MessageKey,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    /// Full text for selected unread messages, a short preview otherwise
    pub content: String,
    pub date: DateTime<Utc>,
    pub is_read: bool,
    pub has_attachment: bool,
    pub folder: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Folder listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxFolder {
    pub name: String,
    /// Hierarchical path, e.g. `[Gmail]/Sent Mail`
    pub full_name: String,
    pub message_count: u32,
    pub unread_count: u32,
}
