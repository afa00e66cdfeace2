//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. mail-assist.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE_NAME: &str = "mail-assist.toml";

/// Text-generation backend type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hugging Face inference API (`inputs` / `parameters` body, bearer token)
    #[default]
    HuggingFace,
    /// Google Gemini `generateContent` API (key in URL)
    Gemini,
}

impl BackendKind {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "gemini" | "google" => BackendKind::Gemini,
            _ => BackendKind::HuggingFace,
        }
    }
}

/// One text-generation backend (model endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Model name, e.g. `facebook/bart-large-cnn` or `gemini-2.0-flash`
    pub model: String,

    /// API key or bearer token
    #[serde(default)]
    pub api_key: String,

    /// Base URL (optional, for custom endpoints and tests)
    #[serde(default)]
    pub base_url: Option<String>,
}

impl BackendConfig {
    pub fn hugging_face(model: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::HuggingFace,
            model: model.into(),
            api_key: String::new(),
            base_url: None,
        }
    }

    pub fn gemini(model: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Gemini,
            model: model.into(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

/// How messages are summarized by the orchestrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Retry each backend with backoff, demote on 503 / API errors
    #[default]
    Retrying,
    /// One attempt per backend, validated, in order
    Fallback,
}

impl SummaryMode {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "fallback" => SummaryMode::Fallback,
            _ => SummaryMode::Retrying,
        }
    }
}

/// Mail account credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Mail address used as IMAP login
    #[serde(default)]
    pub address: String,

    /// Password or app password
    #[serde(default, skip_serializing)]
    pub secret: String,
}

/// IMAP connection and selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    #[serde(default = "default_imap_host")]
    pub host: String,

    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Mailbox to load messages from
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Maximum number of messages shown
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// Maximum number of unread messages fetched in full
    #[serde(default = "default_max_unread")]
    pub max_unread: usize,

    /// Connect / command timeout in seconds
    #[serde(default = "default_imap_timeout")]
    pub timeout_secs: u64,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: default_imap_host(),
            port: default_imap_port(),
            folder: default_folder(),
            max_total: default_max_total(),
            max_unread: default_max_unread(),
            timeout_secs: default_imap_timeout(),
        }
    }
}

impl ImapConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Summarization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub mode: SummaryMode,

    /// Minimum delay between two requests issued by the summarizer
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Delay before each retry; its length is the retry budget
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    /// Content longer than this is truncated with an ellipsis
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Content shorter than this is rejected before any network call
    #[serde(default = "default_min_input_chars")]
    pub min_input_chars: usize,

    /// Candidate backends in demotion order (primary, backup, fallback)
    #[serde(default = "default_summary_backends")]
    pub backends: Vec<BackendConfig>,

    /// HTTP timeout per request in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            mode: SummaryMode::default(),
            min_request_interval_ms: default_min_request_interval_ms(),
            retry_delays_ms: default_retry_delays_ms(),
            max_input_chars: default_max_input_chars(),
            min_input_chars: default_min_input_chars(),
            backends: default_summary_backends(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl SummarizerConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reply suggestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default = "default_reply_backend")]
    pub backend: BackendConfig,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            backend: default_reply_backend(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl ReplyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_imap_host() -> String {
    "imap.gmail.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

fn default_max_total() -> usize {
    20
}

fn default_max_unread() -> usize {
    5
}

fn default_imap_timeout() -> u64 {
    20
}

fn default_min_request_interval_ms() -> u64 {
    1000
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![1000, 2000, 5000]
}

fn default_max_input_chars() -> usize {
    1000
}

fn default_min_input_chars() -> usize {
    10
}

fn default_http_timeout() -> u64 {
    60
}

fn default_summary_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::hugging_face("facebook/bart-large-cnn"),
        BackendConfig::hugging_face("google/pegasus-xsum"),
        BackendConfig::hugging_face("t5-base"),
    ]
}

fn default_reply_backend() -> BackendConfig {
    BackendConfig::gemini("gemini-2.0-flash")
}

/// Main configuration for mail-assist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub imap: ImapConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub replies: ReplyConfig,
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// # 引数
    /// * `path` - TOML ファイルのパス
    ///
    /// # 環境変数展開
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)?;

        let mut cfg = Self::from_toml_str(&toml_content)?;

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    /// TOML 文字列を解析する（環境変数の展開を含む）
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(config))
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// 1. `./mail-assist.toml`
    /// 2. 見つからない場合は環境変数のみ
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_toml_file(CONFIG_FILE_NAME);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// TOML 構造から Config を構築
    fn from_toml_config(toml: TomlConfig) -> Self {
        let account = toml.account.unwrap_or_default();
        let imap = toml.imap.unwrap_or_default();
        let summarizer = toml.summarizer.unwrap_or_default();
        let replies = toml.replies.unwrap_or_default();

        let account_config = AccountConfig {
            address: account.address.unwrap_or_default(),
            secret: account.secret.unwrap_or_default(),
        };

        let imap_config = ImapConfig {
            host: imap.host.unwrap_or_else(default_imap_host),
            port: imap.port.unwrap_or_else(default_imap_port),
            folder: imap.folder.unwrap_or_else(default_folder),
            max_total: imap.max_total.unwrap_or_else(default_max_total),
            max_unread: imap.max_unread.unwrap_or_else(default_max_unread),
            timeout_secs: imap.timeout_secs.unwrap_or_else(default_imap_timeout),
        };

        let backends = match summarizer.backends {
            Some(list) if !list.is_empty() => list.into_iter().map(TomlBackendConfig::into_config).collect(),
            _ => default_summary_backends(),
        };

        let summarizer_config = SummarizerConfig {
            mode: summarizer
                .mode
                .map(|m| SummaryMode::parse(&m))
                .unwrap_or_default(),
            min_request_interval_ms: summarizer
                .min_request_interval_ms
                .unwrap_or_else(default_min_request_interval_ms),
            retry_delays_ms: summarizer
                .retry_delays_ms
                .unwrap_or_else(default_retry_delays_ms),
            max_input_chars: summarizer
                .max_input_chars
                .unwrap_or_else(default_max_input_chars),
            min_input_chars: summarizer
                .min_input_chars
                .unwrap_or_else(default_min_input_chars),
            backends,
            timeout_secs: summarizer.timeout_secs.unwrap_or_else(default_http_timeout),
        };

        let reply_config = ReplyConfig {
            backend: replies
                .backend
                .map(TomlBackendConfig::into_config)
                .unwrap_or_else(default_reply_backend),
            timeout_secs: replies.timeout_secs.unwrap_or_else(default_http_timeout),
        };

        Config {
            account: account_config,
            imap: imap_config,
            summarizer: summarizer_config,
            replies: reply_config,
        }
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        // アカウント
        if let Ok(address) = std::env::var("MAIL_ADDRESS") {
            self.account.address = address;
        }
        if let Ok(secret) = std::env::var("MAIL_SECRET") {
            self.account.secret = secret;
        }

        // IMAP
        if let Ok(host) = std::env::var("IMAP_HOST") {
            if !host.is_empty() {
                self.imap.host = host;
            }
        }
        if let Ok(port) = std::env::var("IMAP_PORT") {
            if let Ok(p) = port.parse() {
                self.imap.port = p;
            }
        }
        if let Ok(folder) = std::env::var("IMAP_FOLDER") {
            if !folder.is_empty() {
                self.imap.folder = folder;
            }
        }
        if let Ok(max) = std::env::var("IMAP_MAX_TOTAL") {
            if let Ok(n) = max.parse() {
                self.imap.max_total = n;
            }
        }
        if let Ok(max) = std::env::var("IMAP_MAX_UNREAD") {
            if let Ok(n) = max.parse() {
                self.imap.max_unread = n;
            }
        }

        // 要約
        if let Ok(mode) = std::env::var("SUMMARIZER_MODE") {
            if !mode.is_empty() {
                self.summarizer.mode = SummaryMode::parse(&mode);
            }
        }
        if let Ok(interval) = std::env::var("SUMMARIZER_MIN_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.summarizer.min_request_interval_ms = ms;
            }
        }

        // API キー（種類ごとに全バックエンドへ適用）
        if let Ok(key) = std::env::var("HUGGING_FACE_API_KEY") {
            if !key.is_empty() {
                self.set_api_key(BackendKind::HuggingFace, &key);
            }
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.set_api_key(BackendKind::Gemini, &key);
            }
        }
    }

    fn set_api_key(&mut self, kind: BackendKind, key: &str) {
        for backend in self
            .summarizer
            .backends
            .iter_mut()
            .chain(std::iter::once(&mut self.replies.backend))
            .filter(|b| b.kind == kind)
        {
            backend.api_key = key.to_string();
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.summarizer.backends.is_empty() {
            return Err(Error::Config(
                "at least one summarizer backend is required".to_string(),
            ));
        }
        if self.imap.max_total == 0 {
            return Err(Error::Config("imap.max_total must be positive".to_string()));
        }
        if self.imap.port == 0 {
            return Err(Error::Config("imap.port must be positive".to_string()));
        }
        Ok(())
    }

    /// Whether account credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.account.address.is_empty() && !self.account.secret.is_empty()
    }
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

/// TOML ファイル用のトップレベル構造
#[derive(Debug, Deserialize)]
struct TomlConfig {
    /// アカウント設定
    account: Option<TomlAccountConfig>,
    /// IMAP 設定
    imap: Option<TomlImapConfig>,
    /// 要約設定
    summarizer: Option<TomlSummarizerConfig>,
    /// 返信候補設定
    replies: Option<TomlReplyConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlAccountConfig {
    address: Option<String>,
    secret: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlImapConfig {
    host: Option<String>,
    port: Option<u16>,
    folder: Option<String>,
    max_total: Option<usize>,
    max_unread: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSummarizerConfig {
    /// "retrying" または "fallback"
    mode: Option<String>,
    min_request_interval_ms: Option<u64>,
    retry_delays_ms: Option<Vec<u64>>,
    max_input_chars: Option<usize>,
    min_input_chars: Option<usize>,
    timeout_secs: Option<u64>,
    backends: Option<Vec<TomlBackendConfig>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlReplyConfig {
    backend: Option<TomlBackendConfig>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlBackendConfig {
    /// "huggingface" または "gemini"
    kind: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
}

impl TomlBackendConfig {
    fn into_config(self) -> BackendConfig {
        let kind = self
            .kind
            .map(|k| BackendKind::parse(&k))
            .unwrap_or_default();
        let model = self.model.unwrap_or_else(|| match kind {
            BackendKind::HuggingFace => "facebook/bart-large-cnn".to_string(),
            BackendKind::Gemini => "gemini-2.0-flash".to_string(),
        });

        BackendConfig {
            kind,
            model,
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url,
        }
    }
}
