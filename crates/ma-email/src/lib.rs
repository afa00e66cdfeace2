//! ma-email: IMAP access for mail-assist
//!
//! This crate provides the mail session, MIME text extraction and
//! unread-first message selection.

pub mod error;
pub mod mime;
pub mod models;
pub mod selector;
pub mod session;

pub use error::{ConnectionErrorKind, EmailError, Result};
pub use mime::{BodyPart, MimePart, extract, has_attachments};
pub use models::{MailboxFolder, Message, MessageId, MessageKey, Priority};
pub use selector::{Candidate, Selected, select};
pub use session::{DEFAULT_HOST, DEFAULT_MAILBOX, DEFAULT_PORT, MailSession, MailSource};
