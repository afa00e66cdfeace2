//! IMAP mail session over TLS
//!
//! All mailbox access is read-only: folders are opened with `EXAMINE` and
//! bodies fetched with `BODY.PEEK[]`, so server flags never change.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, Flag, Mailbox, Name, NameAttribute};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mailparse::MailHeaderMap;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

use ma_core::ImapConfig;

use crate::error::{ConnectionErrorKind, EmailError, Result};
use crate::mime::{MimePart, extract, has_attachments, preview};
use crate::models::{MailboxFolder, Message, MessageKey, NO_SUBJECT, Priority};
use crate::selector::{Candidate, Selected, select};

type ImapSession = async_imap::Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

pub const DEFAULT_HOST: &str = "imap.gmail.com";
pub const DEFAULT_PORT: u16 = 993;
pub const DEFAULT_MAILBOX: &str = "INBOX";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Capability: a mail source the orchestrator can drive
#[async_trait]
pub trait MailSource: Send {
    async fn connect(&mut self, address: &str, secret: &str, host: &str, port: u16) -> Result<()>;

    /// Best effort; failures yield an empty list
    async fn list_folders(&mut self) -> Vec<MailboxFolder>;

    async fn list_messages(
        &mut self,
        folder: &str,
        max_total: usize,
        max_unread: usize,
    ) -> Result<Vec<Message>>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Metadata fetched for every message before selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    pub seq: u32,
    pub uid: Option<u32>,
    pub seen: bool,
    pub internal_date: Option<DateTime<Utc>>,
}

/// How a fetched body is matched back to its metadata. UIDs survive an
/// expunge between the two fetches; sequence numbers do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKey {
    Uid(u32),
    Seq(u32),
}

pub type Bodies = HashMap<BodyKey, Vec<u8>>;

impl MessageMeta {
    pub fn body_key(&self) -> BodyKey {
        match self.uid {
            Some(uid) => BodyKey::Uid(uid),
            None => BodyKey::Seq(self.seq),
        }
    }

    fn from_fetch(fetch: &Fetch) -> Self {
        Self {
            seq: fetch.message,
            uid: fetch.uid,
            seen: fetch.flags().any(|f| matches!(f, Flag::Seen)),
            internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        }
    }
}

impl Candidate for MessageMeta {
    fn received(&self) -> Option<DateTime<Utc>> {
        self.internal_date
    }

    fn is_unread(&self) -> bool {
        !self.seen
    }
}

struct Connection {
    session: ImapSession,
    /// Folder currently selected on the server
    open_folder: Option<String>,
}

impl Connection {
    /// Open a folder read-only. A folder left open by an earlier guard is
    /// closed first.
    async fn open(&mut self, name: &str, timeout: Duration) -> Result<OpenFolder<'_>> {
        self.release_folder(timeout).await;

        let mailbox = with_timeout(timeout, "EXAMINE", self.session.examine(name))
            .await
            .map_err(|e| match e {
                EmailError::Imap(async_imap::error::Error::No(_)) => {
                    EmailError::FolderNotFound(name.to_string())
                }
                other => other,
            })?;

        debug!(folder = name, exists = mailbox.exists, "Opened folder read-only");
        self.open_folder = Some(name.to_string());

        Ok(OpenFolder {
            connection: self,
            name: name.to_string(),
            mailbox,
            timeout,
        })
    }

    async fn release_folder(&mut self, timeout: Duration) {
        if let Some(name) = self.open_folder.take() {
            if let Err(e) = with_timeout(timeout, "CLOSE", self.session.close()).await {
                warn!(folder = %name, "Error closing folder: {}", e);
            }
        }
    }
}

/// The single open folder of a connection
pub struct OpenFolder<'a> {
    connection: &'a mut Connection,
    name: String,
    mailbox: Mailbox,
    timeout: Duration,
}

impl OpenFolder<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_count(&self) -> u32 {
        self.mailbox.exists
    }

    pub fn uid_validity(&self) -> Option<u32> {
        self.mailbox.uid_validity
    }

    /// UID, flags and receipt time of every message in the folder
    pub async fn fetch_metadata(&mut self) -> Result<Vec<MessageMeta>> {
        if self.mailbox.exists == 0 {
            return Ok(Vec::new());
        }

        let session = &mut self.connection.session;
        let fetches: Vec<Fetch> = with_timeout(self.timeout, "FETCH metadata", async {
            session
                .fetch("1:*", "(UID FLAGS INTERNALDATE)")
                .await?
                .try_collect()
                .await
        })
        .await?;

        Ok(fetches.iter().map(MessageMeta::from_fetch).collect())
    }

    /// Raw RFC 5322 bytes for the given messages. Fetched by UID; sequence
    /// numbers are used only for messages the server gave no UID.
    pub async fn fetch_bodies(&mut self, metas: &[&MessageMeta]) -> Result<Bodies> {
        let (uids, seqs): (Vec<BodyKey>, Vec<BodyKey>) = metas
            .iter()
            .map(|m| m.body_key())
            .partition(|key| matches!(key, BodyKey::Uid(_)));

        let mut bodies = Bodies::new();
        if !uids.is_empty() {
            let set = sequence_set(&uids);
            let session = &mut self.connection.session;
            let fetches: Vec<Fetch> = with_timeout(self.timeout, "UID FETCH bodies", async {
                session.uid_fetch(&set, "BODY.PEEK[]").await?.try_collect().await
            })
            .await?;
            bodies.extend(fetches.iter().filter_map(|f| {
                let uid = f.uid?;
                f.body().map(|body| (BodyKey::Uid(uid), body.to_vec()))
            }));
        }
        if !seqs.is_empty() {
            let set = sequence_set(&seqs);
            let session = &mut self.connection.session;
            let fetches: Vec<Fetch> = with_timeout(self.timeout, "FETCH bodies", async {
                session.fetch(&set, "BODY.PEEK[]").await?.try_collect().await
            })
            .await?;
            bodies.extend(
                fetches
                    .iter()
                    .filter_map(|f| f.body().map(|body| (BodyKey::Seq(f.message), body.to_vec()))),
            );
        }
        Ok(bodies)
    }

    pub async fn close(self) -> Result<()> {
        self.connection.open_folder = None;
        with_timeout(self.timeout, "CLOSE", self.connection.session.close()).await
    }
}

/// IMAP session handle: at most one connection, at most one open folder
pub struct MailSession {
    connection: Option<Connection>,
    timeout: Duration,
}

impl Default for MailSession {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl MailSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            connection: None,
            timeout,
        }
    }

    pub fn from_config(config: &ImapConfig) -> Self {
        Self::new(config.timeout())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Log in, check liveness and confirm read access to the inbox.
    /// Any previous connection is torn down first.
    pub async fn connect(&mut self, address: &str, secret: &str, host: &str, port: u16) -> Result<()> {
        if address.trim().is_empty() || secret.is_empty() {
            return Err(EmailError::InvalidCredentials);
        }

        self.disconnect().await;

        info!(host, port, "Connecting to IMAP server");
        let session = open_session(address, secret, host, port, self.timeout).await?;
        let mut connection = Connection {
            session,
            open_folder: None,
        };

        if let Err(e) = verify(&mut connection, self.timeout).await {
            warn!("Connection check failed: {}", e);
            if let Err(e) = with_timeout(self.timeout, "LOGOUT", connection.session.logout()).await {
                debug!("Error logging out after failed check: {}", e);
            }
            return Err(e);
        }

        info!(host, "Connected to IMAP server");
        self.connection = Some(connection);
        Ok(())
    }

    pub async fn list_folders(&mut self) -> Vec<MailboxFolder> {
        match self.try_list_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!("Error getting folders: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_list_folders(&mut self) -> Result<Vec<MailboxFolder>> {
        let timeout = self.timeout;
        let connection = self.connection.as_mut().ok_or(EmailError::NotConnected)?;
        connection.release_folder(timeout).await;

        let session = &mut connection.session;
        let names: Vec<Name> = with_timeout(timeout, "LIST", async {
            session.list(Some(""), Some("*")).await?.try_collect().await
        })
        .await?;

        let mut folders = Vec::with_capacity(names.len());
        for name in &names {
            if name
                .attributes()
                .iter()
                .any(|a| matches!(a, NameAttribute::NoSelect))
            {
                continue;
            }

            let full_name = name.name().to_string();
            let leaf = name
                .delimiter()
                .and_then(|d| full_name.rsplit(d).next())
                .unwrap_or(&full_name)
                .to_string();

            let (message_count, unread_count) = match with_timeout(
                timeout,
                "STATUS",
                connection.session.status(&full_name, "(MESSAGES UNSEEN)"),
            )
            .await
            {
                Ok(status) => (status.exists, status.unseen.unwrap_or(0)),
                Err(e) => {
                    debug!(folder = %full_name, "STATUS failed: {}", e);
                    (0, 0)
                }
            };

            folders.push(MailboxFolder {
                name: leaf,
                full_name,
                message_count,
                unread_count,
            });
        }

        debug!("Listed {} folders", folders.len());
        Ok(folders)
    }

    /// Select and load messages of a folder. The folder is closed again
    /// whether or not loading succeeds.
    pub async fn list_messages(
        &mut self,
        folder: &str,
        max_total: usize,
        max_unread: usize,
    ) -> Result<Vec<Message>> {
        let timeout = self.timeout;
        let connection = self.connection.as_mut().ok_or(EmailError::NotConnected)?;

        let mut open = connection.open(folder, timeout).await?;
        let uid_validity = open.uid_validity();
        let loaded = load_selection(&mut open, max_total, max_unread).await;
        if let Err(e) = open.close().await {
            warn!(folder, "Error closing folder: {}", e);
        }
        let (selected, bodies) = loaded?;

        let messages = assemble_messages(folder, uid_validity, selected, &bodies);
        info!(folder, "Loaded {} messages (unread first)", messages.len());
        Ok(messages)
    }

    /// Close the open folder and log out. Handles are reset even when
    /// the server errors.
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.release_folder(self.timeout).await;
            match with_timeout(self.timeout, "LOGOUT", connection.session.logout()).await {
                Ok(()) => info!("Disconnected from IMAP server"),
                Err(e) => warn!("Error disconnecting: {}", e),
            }
        }
    }
}

#[async_trait]
impl MailSource for MailSession {
    async fn connect(&mut self, address: &str, secret: &str, host: &str, port: u16) -> Result<()> {
        MailSession::connect(self, address, secret, host, port).await
    }

    async fn list_folders(&mut self) -> Vec<MailboxFolder> {
        MailSession::list_folders(self).await
    }

    async fn list_messages(
        &mut self,
        folder: &str,
        max_total: usize,
        max_unread: usize,
    ) -> Result<Vec<Message>> {
        MailSession::list_messages(self, folder, max_total, max_unread).await
    }

    async fn disconnect(&mut self) {
        MailSession::disconnect(self).await
    }

    fn is_connected(&self) -> bool {
        MailSession::is_connected(self)
    }
}

async fn load_selection(
    open: &mut OpenFolder<'_>,
    max_total: usize,
    max_unread: usize,
) -> Result<(Vec<Selected<MessageMeta>>, Bodies)> {
    let metas = open.fetch_metadata().await?;
    let total = metas.len();
    let selected = select(metas, max_total, max_unread);

    let full = selected.iter().filter(|s| s.fetch_full_content).count();
    debug!(
        folder = open.name(),
        "Selected {} unread and {} read of {} messages",
        full,
        selected.len() - full,
        total
    );

    let metas: Vec<&MessageMeta> = selected.iter().map(|s| &s.item).collect();
    let bodies = open.fetch_bodies(&metas).await?;
    Ok((selected, bodies))
}

/// Comma-separated IMAP sequence set of the key numbers
fn sequence_set(keys: &[BodyKey]) -> String {
    keys.iter()
        .map(|key| match key {
            BodyKey::Uid(n) | BodyKey::Seq(n) => n.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Turn selected metadata and fetched bodies into messages, in selection
/// order. Messages that cannot be built are logged and skipped.
pub fn assemble_messages(
    folder: &str,
    uid_validity: Option<u32>,
    selected: Vec<Selected<MessageMeta>>,
    bodies: &Bodies,
) -> Vec<Message> {
    selected
        .into_iter()
        .filter_map(|Selected { item, fetch_full_content }| {
            let Some(raw) = bodies.get(&item.body_key()) else {
                warn!(folder, seq = item.seq, "No body returned for message");
                return None;
            };
            match build_message(&item, raw, folder, uid_validity, fetch_full_content) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(folder, seq = item.seq, "Error processing message: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Build one message from its raw bytes
pub fn build_message(
    meta: &MessageMeta,
    raw: &[u8],
    folder: &str,
    uid_validity: Option<u32>,
    full_content: bool,
) -> Result<Message> {
    let parsed = mailparse::parse_mail(raw)?;
    let headers = &parsed.headers;
    let part = MimePart::from_parsed(&parsed);

    let text = extract(&part);
    let content = if full_content { text } else { preview(&text) };

    let subject = headers
        .get_first_value("Subject")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let from = headers
        .get_first_value("From")
        .and_then(|v| addresses(&v).into_iter().next())
        .unwrap_or_default();

    let to = ["To", "Cc", "Bcc"]
        .iter()
        .flat_map(|h| headers.get_all_values(h))
        .flat_map(|v| addresses(&v))
        .collect();

    let date = meta
        .internal_date
        .or_else(|| {
            headers
                .get_first_value("Date")
                .and_then(|d| mailparse::dateparse(&d).ok())
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
        })
        .unwrap_or_else(Utc::now);

    let priority = headers
        .get_first_value("X-Priority")
        .map(|v| Priority::from_header(&v))
        .unwrap_or_default();

    Ok(Message {
        id: meta.seq.to_string(),
        key: MessageKey::new(folder, uid_validity, meta.uid, meta.seq),
        from,
        to,
        subject,
        content,
        date,
        is_read: meta.seen,
        has_attachment: has_attachments(&part),
        folder: folder.to_string(),
        priority,
        summary: None,
    })
}

/// Bare addresses of an address-list header, groups flattened
fn addresses(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                mailparse::MailAddr::Single(info) => vec![info.addr.clone()],
                mailparse::MailAddr::Group(group) => {
                    group.addrs.iter().map(|info| info.addr.clone()).collect()
                }
            })
            .collect(),
        Err(e) => {
            debug!("Unparseable address list {:?}: {}", value, e);
            Vec::new()
        }
    }
}

fn tls_config() -> Result<Arc<ClientConfig>> {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
    .map_err(|e| EmailError::connection(ConnectionErrorKind::Ssl, e.to_string()))?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    Ok(Arc::new(config))
}

async fn open_session(
    address: &str,
    secret: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<ImapSession> {
    let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| {
            EmailError::connection(
                ConnectionErrorKind::Network,
                format!("connect to {}:{} timed out", host, port),
            )
        })?
        .map_err(|e| EmailError::connection(ConnectionErrorKind::from_io(&e), e.to_string()))?;

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
        EmailError::connection(
            ConnectionErrorKind::Generic,
            format!("invalid server name '{}': {}", host, e),
        )
    })?;

    debug!("TCP connected, starting TLS handshake");
    let connector = TlsConnector::from(tls_config()?);
    let tls = tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| {
            EmailError::connection(ConnectionErrorKind::Network, "TLS handshake timed out")
        })?
        .map_err(|e| EmailError::connection(ConnectionErrorKind::from_io(&e), e.to_string()))?;

    debug!("TLS established, authenticating");
    let client = async_imap::Client::new(tls.compat());
    let session = tokio::time::timeout(timeout, client.login(address, secret))
        .await
        .map_err(|_| EmailError::connection(ConnectionErrorKind::Network, "login timed out"))?
        .map_err(|(e, _client)| {
            EmailError::connection(ConnectionErrorKind::from_login(&e), e.to_string())
        })?;

    Ok(session)
}

/// NOOP, then a trial open and close of the inbox
async fn verify(connection: &mut Connection, timeout: Duration) -> Result<()> {
    with_timeout(timeout, "NOOP", connection.session.noop())
        .await
        .map_err(|e| {
            EmailError::connection(
                ConnectionErrorKind::Generic,
                format!("Connection established but not responding: {}", e),
            )
        })?;

    let inbox = connection.open(DEFAULT_MAILBOX, timeout).await.map_err(|e| {
        EmailError::connection(ConnectionErrorKind::from_message(&e.to_string()), e.to_string())
    })?;
    debug!("INBOX access successful, message count: {}", inbox.message_count());
    inbox.close().await
}

async fn with_timeout<T, F>(timeout: Duration, command: &str, fut: F) -> Result<T>
where
    F: Future<Output = async_imap::error::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(EmailError::from),
        Err(_) => Err(EmailError::Timeout(command.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn raw_message(n: u32, unread: bool) -> Vec<u8> {
        let body = if unread {
            format!(
                "Unread message {} body. {}",
                n,
                "This paragraph is long enough to need more than a preview. ".repeat(4)
            )
        } else {
            format!("Read message {} body. {}", n, "Older context text. ".repeat(10))
        };
        format!(
            "From: Sender {n} <sender{n}@example.com>\r\n\
             To: me@example.com, Team: a@example.com, b@example.com;\r\n\
             Subject: Message {n}\r\n\
             Date: Mon, 6 May 2024 09:00:00 +0000\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             {body}\r\n"
        )
        .into_bytes()
    }

    /// 7 unread and 30 read messages with distinct receipt times
    fn fixture() -> (Vec<MessageMeta>, Bodies) {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut metas = Vec::new();
        let mut bodies = HashMap::new();
        for seq in 1..=37u32 {
            // unread messages are interleaved through the mailbox
            let unread = (seq % 5 == 0 && seq <= 25) || seq >= 36;
            metas.push(MessageMeta {
                seq,
                uid: Some(1000 + seq),
                seen: !unread,
                internal_date: Some(base + ChronoDuration::hours(seq as i64)),
            });
            bodies.insert(BodyKey::Uid(1000 + seq), raw_message(seq, unread));
        }
        (metas, bodies)
    }

    #[test]
    fn test_load_seven_unread_thirty_read() {
        let (metas, bodies) = fixture();
        assert_eq!(metas.iter().filter(|m| !m.seen).count(), 7);

        let selected = select(metas, 20, 5);
        let messages = assemble_messages("INBOX", Some(9), selected, &bodies);
        assert_eq!(messages.len(), 20);

        let (unread, read) = messages.split_at(5);
        let unread_ids: Vec<&str> = unread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(unread_ids, vec!["37", "36", "25", "20", "15"]);
        for message in unread {
            assert!(!message.is_read);
            assert!(message.content.chars().count() > 100);
            assert!(message.content.starts_with("Unread message"));
        }

        assert_eq!(read.len(), 15);
        assert!(read.windows(2).all(|w| w[0].date > w[1].date));
        for message in read {
            assert!(message.is_read);
            assert!(message.content.chars().count() <= 100);
        }
        assert_eq!(read[0].id, "35");
    }

    #[test]
    fn test_build_message_fields() {
        let meta = MessageMeta {
            seq: 4,
            uid: Some(88),
            seen: false,
            internal_date: None,
        };
        let message = build_message(&meta, &raw_message(4, true), "INBOX", Some(3), true).unwrap();

        assert_eq!(message.id, "4");
        assert_eq!(message.key, MessageKey::new("INBOX", Some(3), Some(88), 4));
        assert_eq!(message.from, "sender4@example.com");
        assert_eq!(
            message.to,
            vec!["me@example.com", "a@example.com", "b@example.com"]
        );
        assert_eq!(message.subject, "Message 4");
        // falls back to the Date header without INTERNALDATE
        assert_eq!(message.date, Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap());
        assert_eq!(message.priority, Priority::Normal);
        assert!(!message.has_attachment);
        assert_eq!(message.summary, None);
    }

    #[test]
    fn test_build_message_defaults() {
        let raw = b"X-Priority: 1 (Highest)\r\nContent-Type: text/html\r\n\r\n<p>Hello &amp; welcome</p>\r\n";
        let meta = MessageMeta {
            seq: 1,
            uid: None,
            seen: true,
            internal_date: None,
        };
        let message = build_message(&meta, raw, "Archive", None, false).unwrap();

        assert_eq!(message.subject, NO_SUBJECT);
        assert_eq!(message.from, "");
        assert!(message.to.is_empty());
        assert_eq!(message.content, "Hello & welcome");
        assert_eq!(message.priority, Priority::High);
        assert_eq!(message.key.to_string(), "Archive#1");
    }

    #[test]
    fn test_missing_body_is_skipped() {
        let (metas, mut bodies) = fixture();
        bodies.remove(&BodyKey::Uid(1037));
        let messages = assemble_messages("INBOX", Some(9), select(metas, 20, 5), &bodies);
        assert_eq!(messages.len(), 19);
        assert!(messages.iter().all(|m| m.id != "37"));
    }

    #[test]
    fn test_bodies_pair_by_uid_after_expunge() {
        // message 1 was expunged between the two fetches, so the server now
        // numbers UID 11 as 1 and UID 12 as 2
        let metas = vec![
            MessageMeta {
                seq: 2,
                uid: Some(11),
                seen: false,
                internal_date: None,
            },
            MessageMeta {
                seq: 3,
                uid: Some(12),
                seen: true,
                internal_date: None,
            },
        ];
        let mut bodies = Bodies::new();
        bodies.insert(BodyKey::Uid(11), raw_message(11, true));
        bodies.insert(BodyKey::Uid(12), raw_message(12, false));
        bodies.insert(BodyKey::Seq(2), raw_message(12, false));

        let messages = assemble_messages("INBOX", Some(9), select(metas, 20, 5), &bodies);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].key.to_string(), "INBOX/9:11");
        assert_eq!(messages[0].subject, "Message 11");
        assert!(!messages[0].is_read);
        assert_eq!(messages[1].key.to_string(), "INBOX/9:12");
        assert_eq!(messages[1].subject, "Message 12");
    }

    #[test]
    fn test_body_key_falls_back_to_sequence_number() {
        let with_uid = MessageMeta {
            seq: 5,
            uid: Some(500),
            seen: true,
            internal_date: None,
        };
        let without_uid = MessageMeta {
            uid: None,
            ..with_uid.clone()
        };
        assert_eq!(with_uid.body_key(), BodyKey::Uid(500));
        assert_eq!(without_uid.body_key(), BodyKey::Seq(5));

        let mut bodies = Bodies::new();
        bodies.insert(BodyKey::Seq(5), raw_message(5, false));
        let messages = assemble_messages("INBOX", None, select(vec![without_uid], 20, 5), &bodies);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key.to_string(), "INBOX#5");

        assert_eq!(
            sequence_set(&[BodyKey::Uid(7), BodyKey::Uid(3), BodyKey::Uid(12)]),
            "7,3,12"
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_credentials() {
        let mut session = MailSession::default();
        assert!(matches!(
            session.connect("", "secret", DEFAULT_HOST, DEFAULT_PORT).await,
            Err(EmailError::InvalidCredentials)
        ));
        assert!(matches!(
            session.connect("me@example.com", "", DEFAULT_HOST, DEFAULT_PORT).await,
            Err(EmailError::InvalidCredentials)
        ));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut session = MailSession::new(Duration::from_secs(2));
        let err = tokio_test::assert_err!(
            session
                .connect("me@example.com", "secret", "127.0.0.1", port)
                .await
        );
        assert_eq!(err.connection_kind(), Some(ConnectionErrorKind::Network));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut session = MailSession::default();
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
        assert!(session.list_folders().await.is_empty());
        assert!(matches!(
            session.list_messages("INBOX", 20, 5).await,
            Err(EmailError::NotConnected)
        ));
    }
}
