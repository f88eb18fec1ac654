//! Time-series sink capability.
//!
//! One [`Point`] per retrieved bill, measurement `bill`, tagged with the
//! provider name. Points are encoded as InfluxDB line protocol.

use std::fmt::Write as _;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::normalize::displayed_days_until;
use crate::types::Bill;

/// Measurement name for bill points.
pub const MEASUREMENT: &str = "bill";

/// A field value in a point.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

/// One tagged time-series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// The point written for a retrieved bill.
    ///
    /// An unknown due date is written as the Unix epoch; its days-until
    /// value falls under the stale floor and reads as zero.
    pub fn for_bill(provider: &str, bill: &Bill, now: DateTime<Utc>) -> Self {
        let due = bill.due_date.unwrap_or_default();
        Self {
            measurement: MEASUREMENT.to_string(),
            tags: vec![("type".to_string(), provider.to_string())],
            fields: vec![
                ("amount_due".to_string(), FieldValue::Float(bill.amount_due)),
                (
                    "due_date".to_string(),
                    FieldValue::Text(due.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
                (
                    "days_until_due".to_string(),
                    FieldValue::Integer(displayed_days_until(due, now)),
                ),
            ],
            timestamp: now,
        }
    }

    /// Encode as one line of InfluxDB line protocol (second precision).
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_key(&self.measurement, true);
        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape_key(key, false), escape_key(value, false));
        }
        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Float(f) => format!("{f}"),
                    FieldValue::Integer(i) => format!("{i}i"),
                    FieldValue::Text(s) => {
                        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                    }
                };
                format!("{}={value}", escape_key(key, false))
            })
            .collect();
        line.push_str(&fields.join(","));
        let _ = write!(line, " {}", self.timestamp.timestamp());
        line
    }
}

fn escape_key(s: &str, measurement: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            ',' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            '=' if !measurement => out.push_str("\\="),
            _ => out.push(ch),
        }
    }
    out
}

/// Destination for completed bills.
#[async_trait]
pub trait BillSink: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<()>;
}

/// Sink that only logs points (dry runs, no sink configured).
pub struct LogSink;

#[async_trait]
impl BillSink for LogSink {
    async fn write_point(&self, point: &Point) -> Result<()> {
        info!("point (not written): {}", point.to_line_protocol());
        Ok(())
    }
}
