//! In-memory page, mailbox, sink and view fakes for end-to-end runs.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use billburner::otp::MailboxClient;
use billburner::{
    BillSink, CancelToken, ExecutionContext, Extraction, Ledger, OtpRetriever, PageDriver, Point,
    Secrets, StatusView,
};
use chrono::{DateTime, Utc};

/// A page whose DOM is a set of present selectors and their texts.
#[derive(Default)]
pub struct FakePage {
    pub present: Mutex<HashSet<String>>,
    pub texts: Mutex<HashMap<String, String>>,
    /// Clicking the key reveals the listed nodes and replaces their texts.
    pub on_click: Mutex<HashMap<String, Vec<(String, String)>>>,
    pub visited: Mutex<Vec<String>>,
    pub typed: Mutex<Vec<(String, String)>>,
    pub scripts: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl FakePage {
    pub fn with(self: Arc<Self>, selector: &str, text: &str) -> Arc<Self> {
        self.present.lock().unwrap().insert(selector.to_string());
        self.texts
            .lock()
            .unwrap()
            .insert(selector.to_string(), text.to_string());
        self
    }

    pub fn on_click(self: Arc<Self>, selector: &str, target: &str, text: &str) -> Arc<Self> {
        self.on_click
            .lock()
            .unwrap()
            .entry(selector.to_string())
            .or_default()
            .push((target.to_string(), text.to_string()));
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    fn is_present(&self, selector: &str) -> bool {
        self.present.lock().unwrap().contains(selector)
    }
}

/// Shared handle the session drives while the test keeps inspecting the page.
pub struct PageHandle(pub Arc<FakePage>);

impl Deref for PageHandle {
    type Target = FakePage;

    fn deref(&self) -> &FakePage {
        &self.0
    }
}

#[async_trait]
impl PageDriver for PageHandle {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn wait_ready(&self, selector: &str) -> Result<()> {
        while !self.is_present(selector) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(usize::from(self.is_present(selector)))
    }

    async fn text(&self, selector: &str) -> Result<String> {
        self.texts
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .ok_or_else(|| anyhow!("no node for {selector}"))
    }

    async fn attribute(&self, _selector: &str, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        if let Some(changes) = self.on_click.lock().unwrap().get(selector) {
            let mut present = self.present.lock().unwrap();
            let mut texts = self.texts.lock().unwrap();
            for (target, text) in changes {
                present.insert(target.clone());
                texts.insert(target.clone(), text.clone());
            }
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        self.typed
            .lock()
            .unwrap()
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn url(&self) -> Result<String> {
        Ok(self.visited().last().cloned().unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Mailbox holding `(id, subject, body)` messages.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub messages: Vec<(u32, String, String)>,
}

impl MailboxClient for FakeMailbox {
    fn connect(&mut self, _host: &str, _secure: bool) -> Result<()> {
        Ok(())
    }
    fn login(&mut self, _username: &str, _password: &str) -> Result<()> {
        Ok(())
    }
    fn select_inbox(&mut self) -> Result<()> {
        Ok(())
    }
    fn search_by_subject(&mut self, subject: &str) -> Result<Vec<u32>> {
        Ok(self
            .messages
            .iter()
            .filter(|(_, s, _)| s.contains(subject))
            .map(|(id, _, _)| *id)
            .collect())
    }
    fn fetch_body(&mut self, id: u32) -> Result<Vec<u8>> {
        self.messages
            .iter()
            .find(|(i, _, _)| *i == id)
            .map(|(_, _, body)| body.clone().into_bytes())
            .ok_or_else(|| anyhow!("no message {id}"))
    }
    fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn context(page: &Arc<FakePage>, mailbox: FakeMailbox, secrets: Secrets) -> ExecutionContext {
    ExecutionContext {
        session: Extraction::new(Box::new(PageHandle(Arc::clone(page)))),
        otp: OtpRetriever::new(Arc::new(move || -> Box<dyn MailboxClient> {
            Box::new(mailbox.clone())
        })),
        secrets,
        cancel: CancelToken::new(),
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub points: Mutex<Vec<Point>>,
}

impl RecordingSink {
    pub fn providers(&self) -> Vec<String> {
        self.points
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.tags[0].1.clone())
            .collect()
    }
}

#[async_trait]
impl BillSink for RecordingSink {
    async fn write_point(&self, point: &Point) -> Result<()> {
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingView {
    pub renders: usize,
    pub last_total: f64,
}

impl StatusView for RecordingView {
    fn render(&mut self, ledger: &Ledger, _now: DateTime<Utc>) {
        self.renders += 1;
        self.last_total = ledger.total_due();
    }
}
