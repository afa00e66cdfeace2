//! ma-core: mail-assist core library
//!
//! 設定の読み込み、エラー型、テキスト生成クライアント
//! (要約と返信案の生成) を提供します。

pub mod config;
pub mod error;
pub mod llm;

pub use config::{
    AccountConfig, BackendConfig, BackendKind, Config, ImapConfig, ReplyConfig, SummarizerConfig,
    SummaryMode,
};
pub use error::{Error, GenerationError, Result};
pub use llm::{
    ERROR_MARKER, ReplyGenerator, ReplyOptions, ReplySource, Summarize, Summarizer, TextBackend,
    is_error_text,
};
