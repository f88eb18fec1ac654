//! Browser driver abstraction.
//!
//! `PageDriver` is the fallible, engine-specific layer (Chromium in the
//! runtime, scripted fakes in tests). Workflows never call it directly; they
//! go through the fail-soft [`Extraction`](crate::extraction::Extraction)
//! facade.

use anyhow::Result;
use async_trait::async_trait;

/// A single live browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL and wait for the load to settle.
    async fn navigate(&self, url: &str) -> Result<()>;
    /// Block until a node matching `selector` exists. No timeout.
    async fn wait_ready(&self, selector: &str) -> Result<()>;
    /// Number of nodes currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;
    /// Rendered text of the first match.
    async fn text(&self, selector: &str) -> Result<String>;
    /// Attribute value of the first match.
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;
    /// Simulated user click on the first match.
    async fn click(&self, selector: &str) -> Result<()>;
    /// Simulated keystrokes into the first match.
    async fn type_text(&self, selector: &str, value: &str) -> Result<()>;
    /// Evaluate JavaScript in the page and return its JSON result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// The current page URL.
    async fn url(&self) -> Result<String>;
    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Release the page and its browser.
    async fn close(&self) -> Result<()>;
}
