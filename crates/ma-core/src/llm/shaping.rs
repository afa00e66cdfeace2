//! Content shaping applied before any text-generation call
//!
//! Mail bodies arrive with transfer-encoding leftovers, markup and control
//! characters. Everything sent to a backend goes through [`shape_content`].

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;

use crate::error::GenerationError;

/// Prefix of every sentinel failure string returned through a text channel.
pub const ERROR_MARKER: &str = "Error:";

/// Default cap on prompt content length (characters).
pub const DEFAULT_MAX_CHARS: usize = 1000;

/// Default minimum content length (characters) worth sending.
pub const DEFAULT_MIN_CHARS: usize = 10;

const ELLIPSIS: &str = "...";

/// Instruction placed before the shaped mail content.
pub const SUMMARY_INSTRUCTION: &str = "Summarize the following email. Only use information that is explicitly present in the email body. Do NOT add, infer, or assume any details that are not stated. Clearly state the main points, required actions, and deadlines if mentioned. If the email is an offer, confirmation, request, or advertisement, make that clear. Here is the email:";

static SOFT_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"=\r?\n").unwrap());
static QP_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:=[0-9A-F]{2})+").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static HSPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r]+").unwrap());
static LINE_EDGES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" ?\n ?").unwrap());
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Content-Transfer-Encoding hint for raw content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    Identity,
}

impl TransferEncoding {
    /// Parse a `Content-Transfer-Encoding` header value.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Identity,
        }
    }
}

/// Content ready to be embedded in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedContent {
    pub text: String,
    pub truncated: bool,
}

/// Limits applied by [`shape_content`].
#[derive(Debug, Clone, Copy)]
pub struct ShapeLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ShapeLimits {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Whether a returned text is a sentinel failure rather than a result.
pub fn is_error_text(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_MARKER)
}

/// Build a sentinel failure string.
pub fn error_text(reason: impl AsRef<str>) -> String {
    format!("{} {}", ERROR_MARKER, reason.as_ref())
}

/// Decode quoted-printable soft breaks and `=XX` escapes.
///
/// Escapes are decoded as bytes, so multi-byte UTF-8 sequences survive.
pub fn decode_quoted_printable(input: &str) -> String {
    let joined = SOFT_BREAK.replace_all(input, "");
    QP_RUN
        .replace_all(&joined, |caps: &regex::Captures| {
            let run = &caps[0];
            let bytes: Vec<u8> = run
                .as_bytes()
                .chunks(3)
                .filter_map(|chunk| {
                    std::str::from_utf8(&chunk[1..])
                        .ok()
                        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                })
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .into_owned()
}

/// Decode the five standard HTML entities. `&amp;` goes last so that
/// `&amp;lt;` yields `&lt;` rather than `<`.
pub fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Normalize raw content into plain prose.
pub fn normalize(input: &str) -> String {
    let decoded = decode_quoted_printable(input);
    let stripped = TAG.replace_all(&decoded, "");
    let decoded = decode_entities(&stripped);
    let clean = CONTROL.replace_all(&decoded, "");
    let spaced = HSPACE.replace_all(&clean, " ");
    let lines = LINE_EDGES.replace_all(&spaced, "\n");
    BLANK_RUN.replace_all(&lines, "\n\n").trim().to_string()
}

/// Cut to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (format!("{}{}", &text[..byte_idx], ELLIPSIS), true),
        None => (text.to_string(), false),
    }
}

/// Decode, normalize, validate and truncate content for a prompt.
pub fn shape_content(
    raw: &str,
    encoding: TransferEncoding,
    limits: ShapeLimits,
) -> Result<ShapedContent, GenerationError> {
    if raw.trim().is_empty() {
        return Err(GenerationError::EmptyInput);
    }

    let decoded = match encoding {
        TransferEncoding::Base64 => decode_base64(raw),
        TransferEncoding::QuotedPrintable | TransferEncoding::Identity => raw.to_string(),
    };

    let normalized = normalize(&decoded);
    let len = normalized.chars().count();
    if len < limits.min_chars {
        return Err(GenerationError::InputTooShort(len));
    }

    let (text, truncated) = truncate_chars(&normalized, limits.max_chars);
    Ok(ShapedContent { text, truncated })
}

/// Sentinel text for a shaping failure.
pub fn shaping_error_text(err: &GenerationError) -> String {
    match err {
        GenerationError::EmptyInput => error_text("No content to summarize"),
        GenerationError::InputTooShort(_) => error_text("Content too short to summarize"),
        other => error_text(other.to_string()),
    }
}

/// Prompt sent to summarization backends.
pub fn summary_prompt(content: &ShapedContent) -> String {
    format!("{}\n\n{}", SUMMARY_INSTRUCTION, content.text)
}

fn decode_base64(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Failed to decode base64 content: {}", e);
            raw.to_string()
        }
    }
}
