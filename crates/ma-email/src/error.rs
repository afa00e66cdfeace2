//! Error types for ma-email

use std::io;

use serde::Serialize;
use thiserror::Error;

/// User-facing category of a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionErrorKind {
    Network,
    Authentication,
    Ssl,
    Generic,
}

impl ConnectionErrorKind {
    /// Guidance shown to the user for this category
    pub fn guidance(self) -> &'static str {
        match self {
            ConnectionErrorKind::Network => {
                "Network Error: Unable to establish a secure connection. Please check:\n\
                 1. Your internet connection\n\
                 2. Any VPN or firewall settings\n\
                 3. Try connecting to a different network"
            }
            ConnectionErrorKind::Authentication => {
                "Authentication Error: Unable to log in. Please check:\n\
                 1. Generate a new App Password\n\
                 2. Enable IMAP in Gmail settings\n\
                 3. Allow less secure app access if not using 2FA"
            }
            ConnectionErrorKind::Ssl => {
                "SSL Error: Please check if your device's date/time is correct and try again"
            }
            ConnectionErrorKind::Generic => "Connection Error",
        }
    }

    /// Guidance plus the underlying detail
    pub fn describe(self, detail: &str) -> String {
        match self {
            ConnectionErrorKind::Generic => format!("Connection Error: {}", detail),
            kind => format!("{}\nDetailed error: {}", kind.guidance(), detail),
        }
    }

    /// Classify from server or transport text
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
            ConnectionErrorKind::Ssl
        } else if lower.contains("authentication")
            || lower.contains("authenticationfailed")
            || lower.contains("invalid credentials")
        {
            ConnectionErrorKind::Authentication
        } else if lower.contains("socket")
            || lower.contains("connection refused")
            || lower.contains("timed out")
            || lower.contains("dns")
        {
            ConnectionErrorKind::Network
        } else {
            ConnectionErrorKind::Generic
        }
    }

    /// Classify an I/O failure. A rustls error anywhere in the chain is an
    /// SSL problem; anything else at this layer is a network problem.
    pub fn from_io(err: &io::Error) -> Self {
        if has_tls_cause(err) {
            ConnectionErrorKind::Ssl
        } else {
            ConnectionErrorKind::Network
        }
    }

    /// Classify a failed LOGIN
    pub fn from_login(err: &async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::No(_) => ConnectionErrorKind::Authentication,
            async_imap::error::Error::Io(io) => Self::from_io(io),
            async_imap::error::Error::ConnectionLost => ConnectionErrorKind::Network,
            other => Self::from_message(&other.to_string()),
        }
    }
}

fn has_tls_cause(err: &io::Error) -> bool {
    let mut current = err
        .get_ref()
        .map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

/// ma-email error type
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("{}", .kind.describe(.detail))]
    Connection {
        kind: ConnectionErrorKind,
        detail: String,
    },

    #[error("Email and password cannot be empty")]
    InvalidCredentials,

    #[error("Not connected to a mail server")]
    NotConnected,

    #[error("Folder {0} not found")]
    FolderNotFound(String),

    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Email parsing error: {0}")]
    Parsing(#[from] mailparse::MailParseError),
}

impl EmailError {
    pub fn connection(kind: ConnectionErrorKind, detail: impl Into<String>) -> Self {
        EmailError::Connection {
            kind,
            detail: detail.into(),
        }
    }

    /// Category when this is a connection failure
    pub fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            EmailError::Connection { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EmailError>;
