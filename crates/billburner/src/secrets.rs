//! Credentials and mailbox accounts available to workflows.

use std::collections::HashMap;
use std::fmt;

use crate::otp::MailboxConfig;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Provider credentials keyed by prefix and mailbox accounts keyed by profile.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    credentials: HashMap<String, Credentials>,
    mailboxes: HashMap<String, MailboxConfig>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_credentials(&mut self, prefix: impl Into<String>, credentials: Credentials) {
        self.credentials.insert(prefix.into(), credentials);
    }

    pub fn insert_mailbox(&mut self, profile: impl Into<String>, config: MailboxConfig) {
        self.mailboxes.insert(profile.into(), config);
    }

    pub fn credentials(&self, prefix: &str) -> Option<&Credentials> {
        self.credentials.get(prefix)
    }

    pub fn mailbox(&self, profile: &str) -> Option<&MailboxConfig> {
        self.mailboxes.get(profile)
    }
}
