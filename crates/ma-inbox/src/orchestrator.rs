//! Mailbox loading and enrichment
//!
//! The orchestrator is the only writer of [`MailboxState`]. Loads list the
//! selection through a [`MailSource`], publish it, then summarize the
//! full-content messages one at a time, merging each result by message
//! identity. A newer load cancels the one in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ma_core::llm::{ReplyOptions, ReplySource, ShapeLimits, Summarize, is_error_text};
use ma_core::{Config, GenerationError, ImapConfig};
use ma_email::{MailSession, MailSource, MailboxFolder, Message};

use crate::state::{EnrichmentStage, MailboxState};

/// Content used by [`Orchestrator::check_generation`]
pub const GENERATION_PROBE: &str =
    "This is a test email content to verify the text generation connection.";

/// Which folder to load and how much of it
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub folder: String,
    pub max_total: usize,
    pub max_unread: usize,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self::from(&ImapConfig::default())
    }
}

impl From<&ImapConfig> for LoadSettings {
    fn from(config: &ImapConfig) -> Self {
        Self {
            folder: config.folder.clone(),
            max_total: config.max_total,
            max_unread: config.max_unread,
        }
    }
}

/// Drives a mail source and the text-generation clients
pub struct Orchestrator {
    source: Mutex<Box<dyn MailSource>>,
    summarizer: Arc<dyn Summarize>,
    replies: Arc<dyn ReplySource>,
    state: Arc<watch::Sender<MailboxState>>,
    settings: LoadSettings,
    current_load: StdMutex<CancellationToken>,
    generation: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        source: Box<dyn MailSource>,
        summarizer: Arc<dyn Summarize>,
        replies: Arc<dyn ReplySource>,
        settings: LoadSettings,
    ) -> Self {
        let (state, _) = watch::channel(MailboxState::default());
        Self {
            source: Mutex::new(source),
            summarizer,
            replies,
            state: Arc::new(state),
            settings,
            current_load: StdMutex::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Wire an IMAP session and the configured generation clients
    pub fn from_config(config: &Config) -> ma_core::Result<Self> {
        let summarizer = ma_core::Summarizer::from_config(&config.summarizer)?;
        let replies = ma_core::ReplyGenerator::from_config(&config.replies)?
            .with_limits(ShapeLimits::from(&config.summarizer));
        Ok(Self::new(
            Box::new(MailSession::from_config(&config.imap)),
            Arc::new(summarizer),
            Arc::new(replies),
            LoadSettings::from(&config.imap),
        ))
    }

    pub fn subscribe(&self) -> watch::Receiver<MailboxState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MailboxState {
        self.state.borrow().clone()
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    fn update(&self, f: impl FnOnce(&mut MailboxState)) {
        self.state.send_modify(f);
    }

    /// Cancel the load in flight and start a new generation
    fn start_load(&self) -> (CancellationToken, u64) {
        let token = CancellationToken::new();
        let previous = {
            let mut current = self
                .current_load
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Starting load");
        (token, generation)
    }

    /// Start a new session. Any load in flight is cancelled and the state
    /// of the previous session is cleared before connecting.
    pub async fn connect(
        &self,
        address: &str,
        secret: &str,
        host: &str,
        port: u16,
    ) -> ma_email::Result<()> {
        let (_, generation) = self.start_load();
        self.update(|s| {
            s.replace_messages(Vec::new(), generation);
            s.folders.clear();
            s.begin("Connecting to email server...");
        });

        let result = self
            .source
            .lock()
            .await
            .connect(address, secret, host, port)
            .await;

        match &result {
            Ok(()) => self.update(|s| s.finish("Connected successfully")),
            Err(e) => {
                error!("Connection failed: {}", e);
                let message = e.to_string();
                self.update(|s| s.fail(message, "Connection failed"));
            }
        }
        result
    }

    pub async fn load_folders(&self) -> Vec<MailboxFolder> {
        self.update(|s| s.begin("Loading folders..."));

        let folders = self.source.lock().await.list_folders().await;
        info!("Loaded {} folders", folders.len());

        let published = folders.clone();
        self.update(|s| {
            s.folders = published;
            s.finish("Folders loaded successfully");
        });
        folders
    }

    /// List the selection, publish it, then summarize each full-content
    /// message in order.
    pub async fn load_emails(&self) {
        let (token, generation) = self.start_load();
        self.update(|s| s.begin("Fetching unread emails..."));

        let Some(messages) = self.fetch_selection(&token, generation, "Failed to fetch emails").await
        else {
            return;
        };

        if messages.is_empty() {
            warn!("No unread emails found in {}", self.settings.folder);
            self.update(|s| {
                if s.version <= generation {
                    s.replace_messages(Vec::new(), generation);
                    s.fail("No unread emails found in inbox", "No unread emails");
                }
            });
            return;
        }

        let targets: Vec<Message> = messages.iter().filter(|m| !m.is_read).cloned().collect();
        self.update(|s| {
            s.replace_messages(messages, generation);
            for message in &targets {
                s.set_stage(&message.key, EnrichmentStage::Pending);
            }
        });

        if targets.is_empty() {
            self.update(|s| s.finish("No unread emails to summarize"));
            return;
        }

        let total = targets.len();
        let mut summarized = 0usize;

        for (index, message) in targets.iter().enumerate() {
            if token.is_cancelled() {
                debug!(generation, "Load cancelled before message {}", index + 1);
                return;
            }

            self.update(|s| {
                s.status_text = format!("Summarizing message {} of {}", index + 1, total);
                s.set_stage(&message.key, EnrichmentStage::Summarizing);
            });

            let summary = tokio::select! {
                _ = token.cancelled() => {
                    debug!(generation, "Load cancelled while summarizing {}", message.key);
                    return;
                }
                summary = self.summarizer.summarize(&message.content) => summary,
            };

            if is_error_text(&summary) {
                warn!(key = %message.key, "Failed to summarize message {}: {}", index + 1, summary);
                self.update(|s| {
                    if s.version == generation {
                        s.set_stage(&message.key, EnrichmentStage::Failed);
                    }
                });
                continue;
            }

            let mut merged = false;
            self.update(|s| {
                if s.version == generation {
                    merged = s.merge_summary(&message.key, summary);
                }
            });
            if merged {
                summarized += 1;
                debug!(key = %message.key, "Summarized message {}: {}", index + 1, message.subject);
            } else {
                debug!(key = %message.key, "Dropped summary for message no longer loaded");
            }
        }

        if token.is_cancelled() {
            return;
        }
        info!("Summarized {} of {} messages", summarized, total);
        self.update(|s| {
            if s.version == generation {
                s.finish(format!("Successfully summarized {} of {} messages", summarized, total));
            }
        });
    }

    /// Reload the selection without summarizing. Summaries already known
    /// for the same messages are kept.
    pub async fn refresh_emails(&self) {
        let (token, generation) = self.start_load();
        self.update(|s| s.begin("Refreshing emails..."));

        let Some(mut messages) = self.fetch_selection(&token, generation, "Failed to refresh emails").await
        else {
            return;
        };

        if messages.is_empty() {
            self.update(|s| s.fail("No emails found in inbox", "No emails found"));
            return;
        }

        let count = messages.len();
        self.update(|s| {
            for message in &mut messages {
                if let Some(previous) = s.message(&message.key) {
                    message.summary = previous.summary.clone();
                }
            }
            let kept: Vec<_> = messages
                .iter()
                .filter(|m| m.summary.is_some())
                .map(|m| m.key.clone())
                .collect();

            s.replace_messages(messages, generation);
            for key in &kept {
                s.set_stage(key, EnrichmentStage::Summarized);
            }
            s.finish(format!("Successfully refreshed {} emails", count));
        });
        info!("Refreshed {} emails", count);
    }

    async fn fetch_selection(
        &self,
        token: &CancellationToken,
        generation: u64,
        failure_status: &str,
    ) -> Option<Vec<Message>> {
        let listed = {
            let mut source = self.source.lock().await;
            if token.is_cancelled() {
                return None;
            }
            source
                .list_messages(
                    &self.settings.folder,
                    self.settings.max_total,
                    self.settings.max_unread,
                )
                .await
        };

        if token.is_cancelled() {
            debug!(generation, "Load cancelled after listing");
            return None;
        }

        match listed {
            Ok(messages) => Some(messages),
            Err(e) => {
                error!("{}: {}", failure_status, e);
                let message = e.to_string();
                self.update(|s| {
                    s.replace_messages(Vec::new(), generation);
                    s.fail(message, failure_status);
                });
                None
            }
        }
    }

    /// Draft replies for one message. Nothing is merged into the state.
    pub async fn generate_replies(&self, content: &str) -> Result<ReplyOptions, GenerationError> {
        generate_and_report(self.replies.as_ref(), &self.state, content).await
    }

    /// Draft replies in the background and hand the result to `callback`
    pub fn generate_replies_with<F>(&self, content: String, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<ReplyOptions, GenerationError>) + Send + 'static,
    {
        let replies = Arc::clone(&self.replies);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = generate_and_report(replies.as_ref(), &state, &content).await;
            callback(result);
        })
    }

    /// Summarize a fixed sample text to check the backends respond
    pub async fn check_generation(&self) -> bool {
        self.update(|s| s.begin("Testing text generation..."));

        let summary = self.summarizer.summarize(GENERATION_PROBE).await;
        if is_error_text(&summary) {
            warn!("Text generation test failed: {}", summary);
            self.update(|s| s.fail(summary, "Text generation test failed"));
            false
        } else {
            info!("Text generation test summary: {}", summary);
            self.update(|s| s.finish("Text generation test successful!"));
            true
        }
    }

    /// Cancel any load and disconnect the source
    pub async fn shutdown(&self) {
        self.current_load
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.source.lock().await.disconnect().await;
    }
}

async fn generate_and_report(
    replies: &dyn ReplySource,
    state: &watch::Sender<MailboxState>,
    content: &str,
) -> Result<ReplyOptions, GenerationError> {
    state.send_modify(|s| s.status_text = "Generating responses...".to_string());

    let result = replies.generate_replies(content).await;
    match &result {
        Ok(options) => {
            let count = options.len();
            state.send_modify(|s| s.status_text = format!("Generated {} responses", count));
        }
        Err(e) => {
            warn!("Failed to generate responses: {}", e);
            state.send_modify(|s| {
                s.error = Some("Failed to generate responses.".to_string());
                s.status_text = "Failed to generate responses".to_string();
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use ma_email::{ConnectionErrorKind, EmailError, MessageKey, Priority};
    use tokio::sync::Notify;

    fn message(uid: u32, unread: bool, content: &str) -> Message {
        Message {
            id: uid.to_string(),
            key: MessageKey::new("INBOX", Some(1), Some(uid), uid),
            from: format!("sender{}@example.com", uid),
            to: vec!["me@example.com".to_string()],
            subject: format!("Subject {}", uid),
            content: content.to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() - Duration::hours(uid as i64),
            is_read: !unread,
            has_attachment: false,
            folder: "INBOX".to_string(),
            priority: Priority::Normal,
            summary: None,
        }
    }

    struct FakeSource {
        messages: Vec<Message>,
        fail_list: bool,
        connected: bool,
        folders: Vec<MailboxFolder>,
    }

    impl FakeSource {
        fn with(messages: Vec<Message>) -> Box<Self> {
            Box::new(Self {
                messages,
                fail_list: false,
                connected: false,
                folders: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl MailSource for FakeSource {
        async fn connect(
            &mut self,
            address: &str,
            _secret: &str,
            _host: &str,
            _port: u16,
        ) -> ma_email::Result<()> {
            if address == "bad@example.com" {
                return Err(EmailError::connection(
                    ConnectionErrorKind::Authentication,
                    "LOGIN rejected",
                ));
            }
            self.connected = true;
            Ok(())
        }

        async fn list_folders(&mut self) -> Vec<MailboxFolder> {
            self.folders.clone()
        }

        async fn list_messages(
            &mut self,
            _folder: &str,
            _max_total: usize,
            _max_unread: usize,
        ) -> ma_email::Result<Vec<Message>> {
            if self.fail_list {
                return Err(EmailError::NotConnected);
            }
            Ok(self.messages.clone())
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    /// Echoes content as a summary; content containing FAIL yields a
    /// sentinel. The first call can be parked on a gate.
    #[derive(Default)]
    struct FakeSummarizer {
        calls: AtomicUsize,
        gate_first: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl Summarize for FakeSummarizer {
        async fn summarize(&self, content: &str) -> String {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                if let Some(gate) = &self.gate_first {
                    gate.notified().await;
                }
            }
            if content.contains("FAIL") {
                return "Error: Service unavailable after all attempts".to_string();
            }
            format!("Summary: {}", content)
        }
    }

    struct FakeReplies {
        fail: bool,
    }

    #[async_trait]
    impl ReplySource for FakeReplies {
        async fn generate_replies(&self, content: &str) -> Result<ReplyOptions, GenerationError> {
            if self.fail {
                return Err(GenerationError::AllFailed);
            }
            Ok(ReplyOptions {
                options: vec![format!("Yes to: {}", content), format!("No to: {}", content)],
            })
        }
    }

    fn orchestrator(source: Box<FakeSource>, summarizer: Arc<FakeSummarizer>) -> Orchestrator {
        Orchestrator::new(
            source,
            summarizer,
            Arc::new(FakeReplies { fail: false }),
            LoadSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_load_summarizes_unread_in_order() {
        let source = FakeSource::with(vec![
            message(1, true, "Budget review moved to Friday"),
            message(2, true, "FAIL this one"),
            message(3, true, "Team offsite agenda attached"),
            message(4, false, "Old newsletter preview"),
        ]);
        let summarizer = Arc::new(FakeSummarizer::default());
        let orch = orchestrator(source, summarizer.clone());

        orch.load_emails().await;
        let state = orch.snapshot();

        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(state.version, 1);
        assert_eq!(state.messages.len(), 4);
        assert_eq!(
            state.messages[0].summary.as_deref(),
            Some("Summary: Budget review moved to Friday")
        );
        // sentinel text is never merged
        assert_eq!(state.messages[1].summary, None);
        assert_eq!(state.stage(&state.messages[1].key), Some(EnrichmentStage::Failed));
        assert_eq!(
            state.messages[2].summary.as_deref(),
            Some("Summary: Team offsite agenda attached")
        );
        // read previews are not summarized
        assert_eq!(state.messages[3].summary, None);
        assert_eq!(state.stage(&state.messages[3].key), None);

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.status_text, "Successfully summarized 2 of 3 messages");
    }

    #[tokio::test]
    async fn test_load_publishes_before_summarizing() {
        let gate = Arc::new(Notify::new());
        let summarizer = Arc::new(FakeSummarizer {
            calls: AtomicUsize::new(0),
            gate_first: Some(gate.clone()),
        });
        let source = FakeSource::with(vec![
            message(1, true, "First unread message"),
            message(2, true, "Second unread message"),
        ]);
        let orch = Arc::new(orchestrator(source, summarizer));

        let load = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.load_emails().await }
        });

        let mut rx = orch.subscribe();
        let state = rx
            .wait_for(|s| s.status_text == "Summarizing message 1 of 2")
            .await
            .unwrap()
            .clone();
        assert!(state.is_loading);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.stage(&state.messages[0].key), Some(EnrichmentStage::Summarizing));
        assert_eq!(state.stage(&state.messages[1].key), Some(EnrichmentStage::Pending));

        gate.notify_one();
        load.await.unwrap();

        let state = orch.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.summarized_count(), 2);
        assert_eq!(state.status_text, "Successfully summarized 2 of 2 messages");
    }

    #[tokio::test]
    async fn test_empty_selection_is_non_fatal() {
        let orch = orchestrator(FakeSource::with(vec![]), Arc::new(FakeSummarizer::default()));

        orch.load_emails().await;
        let state = orch.snapshot();

        assert!(!state.is_loading);
        assert!(state.messages.is_empty());
        assert_eq!(state.error.as_deref(), Some("No unread emails found in inbox"));
    }

    #[tokio::test]
    async fn test_list_failure_sets_error() {
        let mut source = FakeSource::with(vec![message(1, true, "unused")]);
        source.fail_list = true;
        let orch = orchestrator(source, Arc::new(FakeSummarizer::default()));

        orch.load_emails().await;
        let state = orch.snapshot();

        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("Not connected to a mail server"));
        assert_eq!(state.status_text, "Failed to fetch emails");
    }

    #[tokio::test]
    async fn test_new_load_cancels_previous() {
        let gate = Arc::new(Notify::new());
        let summarizer = Arc::new(FakeSummarizer {
            calls: AtomicUsize::new(0),
            gate_first: Some(gate.clone()),
        });
        let source = FakeSource::with(vec![
            message(1, true, "Contract renewal due next week"),
            message(2, true, "Dinner plans for Saturday"),
        ]);
        let orch = Arc::new(orchestrator(source, summarizer.clone()));

        let first = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.load_emails().await }
        });

        let mut rx = orch.subscribe();
        rx.wait_for(|s| s.status_text == "Summarizing message 1 of 2")
            .await
            .unwrap();

        orch.load_emails().await;
        first.await.unwrap();

        let state = orch.snapshot();
        assert_eq!(state.version, 2);
        assert_eq!(
            state.messages[0].summary.as_deref(),
            Some("Summary: Contract renewal due next week")
        );
        assert_eq!(state.summarized_count(), 2);
        // the parked call was dropped; only the second load summarized
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.status_text, "Successfully summarized 2 of 2 messages");
    }

    #[tokio::test]
    async fn test_refresh_keeps_known_summaries() {
        let source = FakeSource::with(vec![
            message(1, true, "Quarterly report is ready"),
            message(2, false, "Read preview"),
        ]);
        let summarizer = Arc::new(FakeSummarizer::default());
        let orch = orchestrator(source, summarizer.clone());

        orch.load_emails().await;
        orch.refresh_emails().await;
        let state = orch.snapshot();

        assert_eq!(state.version, 2);
        assert_eq!(state.status_text, "Successfully refreshed 2 emails");
        assert_eq!(
            state.messages[0].summary.as_deref(),
            Some("Summary: Quarterly report is ready")
        );
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_empty() {
        let orch = orchestrator(FakeSource::with(vec![]), Arc::new(FakeSummarizer::default()));
        orch.refresh_emails().await;

        let state = orch.snapshot();
        assert_eq!(state.error.as_deref(), Some("No emails found in inbox"));
        assert_eq!(state.status_text, "No emails found");
    }

    #[tokio::test]
    async fn test_connect_reports_status() {
        let orch = orchestrator(FakeSource::with(vec![]), Arc::new(FakeSummarizer::default()));

        tokio_test::assert_ok!(
            orch.connect("me@example.com", "pw", "imap.example.com", 993)
                .await
        );
        assert_eq!(orch.snapshot().status_text, "Connected successfully");

        let err = tokio_test::assert_err!(
            orch.connect("bad@example.com", "pw", "imap.example.com", 993)
                .await
        );
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Authentication));

        let state = orch.snapshot();
        assert_eq!(state.status_text, "Connection failed");
        assert!(state.error.unwrap().starts_with("Authentication Error"));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_reconnect_resets_state_and_cancels_load() {
        let gate = Arc::new(Notify::new());
        let summarizer = Arc::new(FakeSummarizer {
            calls: AtomicUsize::new(0),
            gate_first: Some(gate.clone()),
        });
        let mut source = FakeSource::with(vec![
            message(1, true, "Old account: invoice overdue"),
            message(2, true, "Old account: password reset"),
        ]);
        source.folders = vec![MailboxFolder {
            name: "Receipts".to_string(),
            full_name: "Receipts".to_string(),
            message_count: 3,
            unread_count: 1,
        }];
        let orch = Arc::new(orchestrator(source, summarizer.clone()));
        tokio_test::assert_ok!(
            orch.connect("old@example.com", "pw", "imap.example.com", 993)
                .await
        );

        let load = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.load_emails().await }
        });
        let mut rx = orch.subscribe();
        rx.wait_for(|s| s.status_text == "Summarizing message 1 of 2")
            .await
            .unwrap();
        assert_eq!(orch.load_folders().await.len(), 1);

        tokio_test::assert_ok!(
            orch.connect("new@example.com", "pw", "imap.example.com", 993)
                .await
        );
        gate.notify_one();
        load.await.unwrap();

        let state = orch.snapshot();
        assert!(state.messages.is_empty());
        assert!(state.folders.is_empty());
        assert!(state.enrichment.is_empty());
        assert_eq!(state.summarized_count(), 0);
        // connect, load, reconnect
        assert_eq!(state.version, 3);
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(state.status_text, "Connected successfully");
        // the cancelled load never asked for message 2
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_folders() {
        let mut source = FakeSource::with(vec![]);
        source.folders = vec![MailboxFolder {
            name: "Sent Mail".to_string(),
            full_name: "[Gmail]/Sent Mail".to_string(),
            message_count: 12,
            unread_count: 0,
        }];
        let orch = orchestrator(source, Arc::new(FakeSummarizer::default()));

        let folders = orch.load_folders().await;
        assert_eq!(folders.len(), 1);

        let state = orch.snapshot();
        assert_eq!(state.folders, folders);
        assert_eq!(state.status_text, "Folders loaded successfully");
    }

    #[tokio::test]
    async fn test_generate_replies_is_transient() {
        let source = FakeSource::with(vec![message(1, true, "Join the panel?")]);
        let orch = orchestrator(source, Arc::new(FakeSummarizer::default()));
        orch.load_emails().await;
        let before = orch.snapshot().messages;

        let replies = orch.generate_replies("Join the panel?").await.unwrap();
        assert_eq!(replies.option(1), Some("Yes to: Join the panel?"));
        assert_eq!(replies.option(2), Some("No to: Join the panel?"));
        assert_eq!(orch.snapshot().messages, before);
    }

    #[tokio::test]
    async fn test_generate_replies_with_callback() {
        let orch = Orchestrator::new(
            FakeSource::with(vec![]),
            Arc::new(FakeSummarizer::default()),
            Arc::new(FakeReplies { fail: true }),
            LoadSettings::default(),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        orch.generate_replies_with("Can you review my draft?".to_string(), move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();

        assert_eq!(rx.await.unwrap().unwrap_err(), GenerationError::AllFailed);
        assert_eq!(
            orch.snapshot().error.as_deref(),
            Some("Failed to generate responses.")
        );
    }

    #[tokio::test]
    async fn test_check_generation() {
        let orch = orchestrator(FakeSource::with(vec![]), Arc::new(FakeSummarizer::default()));
        assert!(orch.check_generation().await);
        assert_eq!(orch.snapshot().status_text, "Text generation test successful!");
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let orch = orchestrator(FakeSource::with(vec![]), Arc::new(FakeSummarizer::default()));
        orch.connect("me@example.com", "pw", "imap.example.com", 993)
            .await
            .unwrap();
        assert!(orch.source.lock().await.is_connected());

        orch.shutdown().await;
        assert!(!orch.source.lock().await.is_connected());
    }
}
