//! Plain-text extraction from MIME trees
//!
//! Parsed mail is lowered into [`MimePart`], a tree with only the shapes
//! extraction cares about, and [`extract`] recurses over it. Extraction
//! never fails: anything unreadable becomes an empty string.

use std::sync::LazyLock;

use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;

use ma_core::llm::decode_entities;

/// Length of the preview kept for messages not fetched in full
pub const PREVIEW_CHARS: usize = 100;

static BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Body of a MIME part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPart {
    PlainText(String),
    Html(String),
    Multipart(Vec<MimePart>),
    Other,
}

/// A MIME part with its content disposition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Disposition token (`attachment`, `inline`, ...) as sent
    pub disposition: Option<String>,
    pub body: BodyPart,
}

impl MimePart {
    pub fn new(body: BodyPart) -> Self {
        Self {
            disposition: None,
            body,
        }
    }

    pub fn with_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }

    /// Parse raw RFC 5322 bytes
    pub fn parse(raw: &[u8]) -> Result<Self, mailparse::MailParseError> {
        Ok(Self::from_parsed(&mailparse::parse_mail(raw)?))
    }

    /// Lower a parsed mail; bodies are decoded per transfer encoding and charset
    pub fn from_parsed(mail: &ParsedMail<'_>) -> Self {
        let mimetype = mail.ctype.mimetype.to_lowercase();

        let body = if mimetype.starts_with("multipart/") {
            BodyPart::Multipart(mail.subparts.iter().map(Self::from_parsed).collect())
        } else if mimetype == "text/plain" {
            BodyPart::PlainText(mail.get_body().unwrap_or_default())
        } else if mimetype == "text/html" {
            BodyPart::Html(mail.get_body().unwrap_or_default())
        } else {
            BodyPart::Other
        };

        let disposition = mail
            .headers
            .get_first_value("Content-Disposition")
            .and_then(|value| {
                let token = value.split(';').next().unwrap_or_default().trim().to_string();
                (!token.is_empty()).then_some(token)
            });

        Self { disposition, body }
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("attachment"))
    }
}

/// Readable text of a part, trimmed
pub fn extract(part: &MimePart) -> String {
    extract_body(&part.body).trim().to_string()
}

fn extract_body(body: &BodyPart) -> String {
    match body {
        BodyPart::PlainText(text) => text.clone(),
        BodyPart::Html(html) => html_to_text(html),
        BodyPart::Multipart(children) => {
            let plain = children
                .iter()
                .find(|c| matches!(c.body, BodyPart::PlainText(_)));
            if let Some(child) = plain {
                return extract_body(&child.body);
            }

            let html = children.iter().find(|c| matches!(c.body, BodyPart::Html(_)));
            if let Some(child) = html {
                return extract_body(&child.body);
            }

            children
                .iter()
                .map(|c| extract_body(&c.body))
                .collect::<Vec<_>>()
                .join("\n")
        }
        BodyPart::Other => String::new(),
    }
}

/// Strip markup and decode the standard entities
pub fn html_to_text(html: &str) -> String {
    let broken = BREAK_TAG.replace_all(html, "\n");
    let stripped = TAG.replace_all(&broken, "");
    decode_entities(&stripped)
}

/// Whether a top-level multipart has a direct child sent as an attachment
pub fn has_attachments(message: &MimePart) -> bool {
    match &message.body {
        BodyPart::Multipart(children) => children.iter().any(MimePart::is_attachment),
        _ => false,
    }
}

/// First [`PREVIEW_CHARS`] characters of a text
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
