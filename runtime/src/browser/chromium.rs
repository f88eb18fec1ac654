//! Chromium page driver using chromiumoxide.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use billburner::{script, PageDriver};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::find_chromium;
use super::stealth::STEALTH_SCRIPT;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 850;
const READY_POLL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub profile_dir: PathBuf,
    /// Explicit executable; discovered with [`find_chromium`] when `None`.
    pub executable: Option<PathBuf>,
}

/// One Chromium process with a single page, shared by every workflow.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page with the masking script installed.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = match &options.executable {
            Some(path) => path.clone(),
            None => find_chromium().context(
                "Chromium not found. Install Chrome or set BILLBURNER_CHROMIUM_PATH.",
            )?,
        };
        debug!("launching {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&options.profile_dir)
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(None)
            .arg("--profile-directory=Profile")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .context("failed to install masking script")?;

        info!("Chromium session started");
        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
        })
    }

    async fn element(&self, selector: &str) -> Result<chromiumoxide::element::Element> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches `{selector}`"))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        if let Err(e) = self.page.wait_for_navigation().await {
            debug!("no navigation settled after {url}: {e}");
        }
        Ok(())
    }

    async fn wait_ready(&self, selector: &str) -> Result<()> {
        while self.count(selector).await? == 0 {
            tokio::time::sleep(READY_POLL).await;
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let value = self.execute_js(&script::count(selector)).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| anyhow!("unexpected count result {value}"))
    }

    async fn text(&self, selector: &str) -> Result<String> {
        let text = self
            .element(selector)
            .await?
            .inner_text()
            .await
            .context("failed to read inner text")?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.element(selector)
            .await?
            .attribute(name)
            .await
            .with_context(|| format!("failed to read attribute {name}"))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.element(selector)
            .await?
            .click()
            .await
            .context("click failed")?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element.focus().await.context("focus failed")?;
        element.type_str(value).await.context("typing failed")?;
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("screenshot failed")
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        let closed = bounded(CLOSE_TIMEOUT, browser.close()).await;
        if closed.is_none() {
            warn!(
                "Chromium did not close within {}s, killing it",
                CLOSE_TIMEOUT.as_secs()
            );
            if let Some(Err(e)) = browser.kill().await {
                warn!("failed to kill Chromium: {e}");
            }
        }
        if bounded(CLOSE_TIMEOUT, browser.wait()).await.is_none() {
            warn!("Chromium process still running after {}s", CLOSE_TIMEOUT.as_secs());
        }
        self.handler.abort();
        match closed {
            Some(Ok(_)) => {
                info!("Chromium session closed");
                Ok(())
            }
            Some(Err(e)) => Err(anyhow!("failed to close Chromium: {e}")),
            None => Err(anyhow!(
                "Chromium did not close within {}s",
                CLOSE_TIMEOUT.as_secs()
            )),
        }
    }
}

/// `None` when `fut` is still pending after `limit`.
async fn bounded<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(limit, fut).await.ok()
}
