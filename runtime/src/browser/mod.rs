//! Browser session management.
//!
//! Executable discovery, the persistent profile directory and the
//! automation-signal masking script. The Chromium [`PageDriver`] lives in
//! [`chromium`].

pub mod chromium;
pub mod stealth;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use billburner::PageDriver;

/// Environment variable overriding executable discovery.
pub const CHROMIUM_PATH_ENV: &str = "BILLBURNER_CHROMIUM_PATH";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Default profile location under the user's config directory.
pub fn default_profile_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no user config directory")?;
    Ok(base.join("billburner").join("chrome-profile"))
}

/// Create the profile directory, wiping any previous contents unless `keep`.
pub fn prepare_profile_dir(dir: &Path, keep: bool) -> Result<()> {
    if !keep && dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("failed to remove profile {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create profile {}", dir.display()))?;
    Ok(())
}

/// Driver used when no workflow needs a browser.
///
/// Every page operation fails; closing succeeds.
pub struct NoopDriver;

#[async_trait]
impl PageDriver for NoopDriver {
    async fn navigate(&self, _url: &str) -> Result<()> {
        Err(anyhow!("browser not available"))
    }
    async fn wait_ready(&self, _selector: &str) -> Result<()> {
        Err(anyhow!("browser not available"))
    }
    async fn count(&self, _selector: &str) -> Result<usize> {
        Err(anyhow!("browser not available"))
    }
    async fn text(&self, _selector: &str) -> Result<String> {
        Err(anyhow!("browser not available"))
    }
    async fn attribute(&self, _selector: &str, _name: &str) -> Result<Option<String>> {
        Err(anyhow!("browser not available"))
    }
    async fn click(&self, _selector: &str) -> Result<()> {
        Err(anyhow!("browser not available"))
    }
    async fn type_text(&self, _selector: &str, _value: &str) -> Result<()> {
        Err(anyhow!("browser not available"))
    }
    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Err(anyhow!("browser not available"))
    }
    async fn url(&self) -> Result<String> {
        Err(anyhow!("browser not available"))
    }
    async fn screenshot(&self) -> Result<Vec<u8>> {
        Err(anyhow!("browser not available"))
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
