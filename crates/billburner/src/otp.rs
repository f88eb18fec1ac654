//! One-time code retrieval from a mailbox.
//!
//! The mailbox protocol client is blocking, so each fetch runs on a blocking
//! task and hands its result back through a single-slot channel. The caller
//! waits on that channel without a timeout of its own; the run's
//! cancellation token bounds the total wait.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::types::{BillError, BillResult};

/// Connection parameters for one mailbox account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    pub host: String,
    /// Use TLS (port 993) instead of plaintext (port 143).
    pub secure: bool,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A blocking mailbox protocol session.
pub trait MailboxClient: Send {
    fn connect(&mut self, host: &str, secure: bool) -> Result<()>;
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn select_inbox(&mut self) -> Result<()>;
    /// Message identifiers whose Subject header matches, in server order.
    fn search_by_subject(&mut self, subject: &str) -> Result<Vec<u32>>;
    /// Raw body of one message, fetched without marking it read.
    fn fetch_body(&mut self, id: u32) -> Result<Vec<u8>>;
    fn logout(&mut self) -> Result<()>;
}

/// Creates a fresh, unconnected client per fetch.
pub trait MailboxFactory: Send + Sync {
    fn client(&self) -> Box<dyn MailboxClient>;
}

impl<F> MailboxFactory for F
where
    F: Fn() -> Box<dyn MailboxClient> + Send + Sync,
{
    fn client(&self) -> Box<dyn MailboxClient> {
        self()
    }
}

/// What to look for in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeQuery {
    pub subject: String,
    /// Text immediately preceding the code.
    pub start: String,
    /// Text immediately following the code.
    pub end: String,
}

/// Fetches verification codes from the most recent matching message.
#[derive(Clone)]
pub struct OtpRetriever {
    factory: Arc<dyn MailboxFactory>,
}

impl OtpRetriever {
    pub fn new(factory: Arc<dyn MailboxFactory>) -> Self {
        Self { factory }
    }

    /// Fetch a code, or an empty string when none is available.
    ///
    /// Every failure (connect, login, empty search, missing delimiter)
    /// collapses to `""` with the cause logged.
    pub async fn fetch_code(&self, config: &MailboxConfig, query: &CodeQuery) -> String {
        match self.try_fetch_code(config, query).await {
            Ok(code) => code,
            Err(e) => {
                warn!("{e}");
                String::new()
            }
        }
    }

    /// Like [`fetch_code`](Self::fetch_code) but keeps the failure cause.
    pub async fn try_fetch_code(
        &self,
        config: &MailboxConfig,
        query: &CodeQuery,
    ) -> BillResult<String> {
        let (tx, rx) = oneshot::channel();
        let mut client = self.factory.client();
        let config = config.clone();
        let query = query.clone();

        tokio::task::spawn_blocking(move || {
            let result = retrieve(client.as_mut(), &config, &query);
            let _ = tx.send(result);
        });

        rx.await.unwrap_or_else(|_| {
            Err(BillError::Connection(
                "mailbox task ended without a result".to_string(),
            ))
        })
    }
}

fn retrieve(
    client: &mut dyn MailboxClient,
    config: &MailboxConfig,
    query: &CodeQuery,
) -> BillResult<String> {
    client
        .connect(&config.host, config.secure)
        .map_err(|e| BillError::Connection(format!("connecting to {}: {e:#}", config.host)))?;

    let outcome = read_code(client, config, query);

    if let Err(e) = client.logout() {
        debug!("mailbox logout failed: {e:#}");
    }
    outcome
}

fn read_code(
    client: &mut dyn MailboxClient,
    config: &MailboxConfig,
    query: &CodeQuery,
) -> BillResult<String> {
    client
        .login(&config.username, &config.password)
        .map_err(|e| BillError::Connection(format!("logging in as {}: {e:#}", config.username)))?;
    client
        .select_inbox()
        .map_err(|e| BillError::Connection(format!("selecting INBOX: {e:#}")))?;

    let ids = client
        .search_by_subject(&query.subject)
        .map_err(|e| BillError::Connection(format!("searching mailbox: {e:#}")))?;
    let id = most_recent(&ids).ok_or_else(|| {
        BillError::OtpUnavailable(format!("no message with subject {:?}", query.subject))
    })?;

    info!("reading message {id} for subject {:?}", query.subject);
    let body = client
        .fetch_body(id)
        .map_err(|e| BillError::Connection(format!("fetching message {id}: {e:#}")))?;
    let body = String::from_utf8_lossy(&body);

    extract_code(&body, &query.start, &query.end).ok_or_else(|| {
        BillError::OtpUnavailable(format!(
            "delimiters {:?}..{:?} not found in message {id}",
            query.start, query.end
        ))
    })
}

/// The message treated as most recent: the numerically highest identifier.
///
/// Not every mail protocol guarantees identifiers follow delivery order.
pub fn most_recent(ids: &[u32]) -> Option<u32> {
    ids.iter().copied().max()
}

/// The trimmed text between `start` and the next `end`.
pub fn extract_code(body: &str, start: &str, end: &str) -> Option<String> {
    let (_, rest) = body.split_once(start)?;
    let (code, _) = rest.split_once(end)?;
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}
