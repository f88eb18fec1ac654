//! InfluxDB v2 sink over the HTTP write API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use billburner::{BillSink, Point};
use tracing::debug;

use crate::config::InfluxConfig;

/// Writes points with `POST /api/v2/write` at second precision.
pub struct InfluxSink {
    client: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn write_url(&self) -> String {
        format!("{}/api/v2/write", self.config.url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl BillSink for InfluxSink {
    async fn write_point(&self, point: &Point) -> Result<()> {
        let line = point.to_line_protocol();
        debug!("writing {line}");

        let response = self
            .client
            .post(self.write_url())
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "s"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await
            .context("InfluxDB write request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("InfluxDB rejected write ({status}): {body}");
        }
        Ok(())
    }
}
