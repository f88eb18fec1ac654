//! IMAP mailbox client used for one-time code retrieval.
//!
//! Blocking; the core library runs it on a blocking task.

use std::net::TcpStream;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use billburner::MailboxClient;
use native_tls::{TlsConnector, TlsStream};

/// Port for IMAP over TLS.
pub const TLS_PORT: u16 = 993;
/// Port for plaintext IMAP.
pub const PLAIN_PORT: u16 = 143;

const IO_TIMEOUT: Duration = Duration::from_secs(30);

enum Link {
    Idle,
    Connected(Greeted),
    Authenticated(Session),
}

enum Greeted {
    Tls(imap::Client<TlsStream<TcpStream>>),
    Plain(imap::Client<TcpStream>),
}

enum Session {
    Tls(imap::Session<TlsStream<TcpStream>>),
    Plain(imap::Session<TcpStream>),
}

macro_rules! with_session {
    ($session:expr, $s:ident => $body:expr) => {
        match $session {
            Session::Tls($s) => $body,
            Session::Plain($s) => $body,
        }
    };
}

/// A [`MailboxClient`] speaking IMAP.
pub struct ImapMailbox {
    link: Link,
}

impl ImapMailbox {
    pub fn new() -> Self {
        Self { link: Link::Idle }
    }

    fn session(&mut self) -> Result<&mut Session> {
        match &mut self.link {
            Link::Authenticated(session) => Ok(session),
            _ => bail!("not logged in"),
        }
    }
}

impl Default for ImapMailbox {
    fn default() -> Self {
        Self::new()
    }
}

fn open_stream(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port))
        .with_context(|| format!("failed to connect to {host}:{port}"))?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;
    Ok(stream)
}

impl MailboxClient for ImapMailbox {
    fn connect(&mut self, host: &str, secure: bool) -> Result<()> {
        let greeted = if secure {
            let tcp = open_stream(host, TLS_PORT)?;
            let tls = TlsConnector::builder()
                .build()
                .context("failed to build TLS connector")?;
            let stream = tls
                .connect(host, tcp)
                .map_err(|e| anyhow!("TLS handshake with {host} failed: {e}"))?;
            let mut client = imap::Client::new(stream);
            client.read_greeting().context("no IMAP greeting")?;
            Greeted::Tls(client)
        } else {
            let mut client = imap::Client::new(open_stream(host, PLAIN_PORT)?);
            client.read_greeting().context("no IMAP greeting")?;
            Greeted::Plain(client)
        };
        self.link = Link::Connected(greeted);
        Ok(())
    }

    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let session = match std::mem::replace(&mut self.link, Link::Idle) {
            Link::Connected(Greeted::Tls(client)) => client
                .login(username, password)
                .map(Session::Tls)
                .map_err(|(e, _)| e),
            Link::Connected(Greeted::Plain(client)) => client
                .login(username, password)
                .map(Session::Plain)
                .map_err(|(e, _)| e),
            other => {
                self.link = other;
                bail!("login requires a fresh connection");
            }
        }
        .context("IMAP login rejected")?;
        self.link = Link::Authenticated(session);
        Ok(())
    }

    fn select_inbox(&mut self) -> Result<()> {
        with_session!(self.session()?, s => s.select("INBOX"))?;
        Ok(())
    }

    fn search_by_subject(&mut self, subject: &str) -> Result<Vec<u32>> {
        let query = format!("HEADER Subject {}", quote(subject));
        let found = with_session!(self.session()?, s => s.search(&query))?;
        let mut ids: Vec<u32> = found.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch_body(&mut self, id: u32) -> Result<Vec<u8>> {
        let messages = with_session!(self.session()?, s => s.fetch(id.to_string(), "BODY.PEEK[]"))?;
        let body = messages
            .iter()
            .find_map(|m| m.body())
            .with_context(|| format!("message {id} has no body"))?;
        Ok(body.to_vec())
    }

    fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.link, Link::Idle) {
            Link::Authenticated(mut session) => {
                with_session!(&mut session, s => s.logout())?;
            }
            Link::Connected(_) | Link::Idle => {}
        }
        Ok(())
    }
}

/// Quote a string for an IMAP search.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(
            quote("Pennymac - Email Confirmation"),
            "\"Pennymac - Email Confirmation\""
        );
        assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn test_operations_require_login() {
        let mut mailbox = ImapMailbox::new();
        assert!(mailbox.select_inbox().is_err());
        assert!(mailbox.search_by_subject("Verification Code").is_err());
        assert!(mailbox.login("user", "pass").is_err());
        assert!(mailbox.logout().is_ok());
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop a listener to get a port nothing accepts on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        assert!(open_stream("127.0.0.1", port).is_err());
    }
}
