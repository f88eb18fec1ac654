//! Fail-soft extraction facade over a [`PageDriver`].
//!
//! Every operation logs and returns a zero value (empty string, `false`,
//! `Null`, empty bytes) instead of an error. Callers cannot tell "genuinely
//! empty" from "operation failed"; workflows rely on bounded polls
//! ([`Extraction::element_exists`]) for their failure signal.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::script;

/// Interval between bounded-poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pause before synthetic input/change events are fired.
pub const EVENT_DELAY: Duration = Duration::from_millis(500);

/// How an element is read or clicked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Via {
    /// The driver's native accessor or input simulation.
    #[default]
    Native,
    /// An in-page script; reaches dynamically-set values and bypasses
    /// overlay hit-testing.
    Script,
}

/// How text is entered into an input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMethod {
    /// Simulated keystrokes.
    #[default]
    Keystrokes,
    /// Direct assignment of the element's `value`.
    Assign,
}

/// The browser session as seen by workflows.
pub struct Extraction {
    driver: Box<dyn PageDriver>,
    poll_interval: Duration,
    event_delay: Duration,
}

impl Extraction {
    pub fn new(driver: Box<dyn PageDriver>) -> Self {
        Self {
            driver,
            poll_interval: POLL_INTERVAL,
            event_delay: EVENT_DELAY,
        }
    }

    /// Override the bounded-poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the delay before synthetic input events.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub async fn navigate(&self, url: &str) {
        debug!("navigate {url}");
        if let Err(e) = self.driver.navigate(url).await {
            warn!("error navigating to URL {url:?}: {e:#}");
        }
    }

    /// Block until `selector` matches. No timeout; bounded only by
    /// cancellation of the caller.
    pub async fn wait_ready(&self, selector: &str) {
        if let Err(e) = self.driver.wait_ready(selector).await {
            warn!("error waiting for element {selector:?} to be ready: {e:#}");
        }
    }

    /// Bounded poll: true on the first attempt that sees a match, false once
    /// more than `timeout_ms` has elapsed with no match.
    pub async fn element_exists(&self, selector: &str, timeout_ms: u64) -> bool {
        self.poll_until(timeout_ms, || async move {
            match self.driver.count(selector).await {
                Ok(n) => n > 0,
                Err(e) => {
                    warn!("error checking existence for selector {selector:?}: {e:#}");
                    false
                }
            }
        })
        .await
    }

    /// Bounded poll over an arbitrary readiness check.
    pub async fn poll_until<F, Fut>(&self, timeout_ms: u64, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        loop {
            if check().await {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn get_text(&self, selector: &str, via: Via) -> String {
        let result = match via {
            Via::Native => self.driver.text(selector).await,
            Via::Script => self
                .driver
                .execute_js(&script::text_of(selector))
                .await
                .map(|v| json_to_string(&v)),
        };
        result.unwrap_or_else(|e| {
            warn!("failed to get text from selector {selector:?}: {e:#}");
            String::new()
        })
    }

    pub async fn get_attribute(&self, name: &str, selector: &str, via: Via) -> String {
        let result = match via {
            Via::Native => self
                .driver
                .attribute(selector, name)
                .await
                .map(Option::unwrap_or_default),
            Via::Script => self
                .driver
                .execute_js(&script::attribute_of(selector, name))
                .await
                .map(|v| json_to_string(&v)),
        };
        result.unwrap_or_else(|e| {
            warn!("failed to get attribute {name:?} from selector {selector:?}: {e:#}");
            String::new()
        })
    }

    pub async fn click(&self, selector: &str, via: Via) {
        let result = match via {
            Via::Native => self.driver.click(selector).await,
            Via::Script => self
                .driver
                .execute_js(&script::click(selector))
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!("failed to click on selector {selector:?}: {e:#}");
        }
    }

    /// Enter `value` into an input, optionally firing input/change events
    /// after [`EVENT_DELAY`] for frameworks that only observe those.
    pub async fn input_text(
        &self,
        selector: &str,
        value: &str,
        method: InputMethod,
        dispatch_events: bool,
    ) {
        let result = match method {
            InputMethod::Keystrokes => self.driver.type_text(selector, value).await,
            InputMethod::Assign => self
                .driver
                .execute_js(&script::assign_value(selector, value))
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!("failed to input text into {selector:?}: {e:#}");
            return;
        }

        if dispatch_events {
            tokio::time::sleep(self.event_delay).await;
            if let Err(e) = self
                .driver
                .execute_js(&script::dispatch_input_events(selector))
                .await
            {
                warn!("failed to dispatch input events on {selector:?}: {e:#}");
            }
        }
    }

    pub async fn evaluate_script(&self, code: &str) -> serde_json::Value {
        self.driver.execute_js(code).await.unwrap_or_else(|e| {
            warn!("error executing JavaScript: {e:#}");
            serde_json::Value::Null
        })
    }

    pub async fn current_url(&self) -> String {
        self.driver.url().await.unwrap_or_else(|e| {
            warn!("error retrieving current URL: {e:#}");
            String::new()
        })
    }

    pub async fn capture_screenshot(&self) -> Vec<u8> {
        self.driver.screenshot().await.unwrap_or_else(|e| {
            warn!("failed to capture screenshot: {e:#}");
            Vec::new()
        })
    }

    /// Tear down the browser session.
    pub async fn close(&self) {
        if let Err(e) = self.driver.close().await {
            warn!("error closing browser: {e:#}");
        }
    }
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
