//! Text-to-value normalization for amounts and due dates scraped from pages.
//!
//! Providers render the same facts in different shapes ("$1,234.56",
//! "Due Apr 28, 2024", "Pay by 05/06/24 to avoid..."). A [`DateLayout`] names
//! the chrono format for one provider plus the cleanup needed to isolate the
//! date from surrounding prose.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::types::{BillError, BillResult};

/// Days-until values below this are shown (and written) as zero.
pub const STALE_DAYS_FLOOR: i64 = -100;

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s*([0-9][0-9,]*\.[0-9]{2})").expect("amount regex is valid")
    })
}

/// Parse the first currency amount in `text`.
pub fn try_parse_amount(text: &str) -> BillResult<f64> {
    let caps = amount_regex()
        .captures(text)
        .ok_or_else(|| BillError::ParseFailure(format!("no currency amount in {text:?}")))?;
    let digits = caps[1].replace(',', "");
    digits
        .parse::<f64>()
        .map_err(|e| BillError::ParseFailure(format!("bad amount {digits:?}: {e}")))
}

/// Parse the first `$` amount in `text`, or zero when none is present.
///
/// Zero is indistinguishable from a genuine zero balance.
pub fn parse_amount(text: &str) -> f64 {
    match try_parse_amount(text) {
        Ok(amount) => amount,
        Err(e) => {
            debug!("{e}");
            0.0
        }
    }
}

/// A text rewrite applied before date parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Cleanup {
    /// Keep only what follows the first occurrence of the marker.
    After(String),
    /// Keep only what precedes the first occurrence of the marker.
    Before(String),
    /// Delete every occurrence of the phrase.
    Remove(String),
    /// Keep the first whitespace-separated word.
    FirstWord,
    /// Replace line breaks with spaces.
    JoinLines,
}

impl Cleanup {
    fn apply(&self, text: &str) -> Option<String> {
        match self {
            Cleanup::After(marker) => text
                .split_once(marker.as_str())
                .map(|(_, rest)| rest.to_string()),
            Cleanup::Before(marker) => Some(
                text.split_once(marker.as_str())
                    .map_or(text, |(head, _)| head)
                    .to_string(),
            ),
            Cleanup::Remove(phrase) => Some(text.replace(phrase.as_str(), "")),
            Cleanup::FirstWord => text.split_whitespace().next().map(str::to_string),
            Cleanup::JoinLines => Some(text.replace(['\r', '\n'], " ")),
        }
    }
}

/// How one provider renders its due date.
#[derive(Debug, Clone, PartialEq)]
pub struct DateLayout {
    /// chrono format string, e.g. `"%b %d, %Y"`.
    pub format: String,
    /// Rewrites applied in order before parsing.
    pub cleanup: Vec<Cleanup>,
    /// The page omits the year; append the current one before parsing.
    pub assume_current_year: bool,
}

impl DateLayout {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            cleanup: Vec::new(),
            assume_current_year: false,
        }
    }

    pub fn after(mut self, marker: impl Into<String>) -> Self {
        self.cleanup.push(Cleanup::After(marker.into()));
        self
    }

    pub fn before(mut self, marker: impl Into<String>) -> Self {
        self.cleanup.push(Cleanup::Before(marker.into()));
        self
    }

    pub fn remove(mut self, phrase: impl Into<String>) -> Self {
        self.cleanup.push(Cleanup::Remove(phrase.into()));
        self
    }

    pub fn first_word(mut self) -> Self {
        self.cleanup.push(Cleanup::FirstWord);
        self
    }

    pub fn join_lines(mut self) -> Self {
        self.cleanup.push(Cleanup::JoinLines);
        self
    }

    pub fn current_year(mut self) -> Self {
        self.assume_current_year = true;
        self
    }
}

/// Parse a due date relative to `today` (used for year-less layouts).
///
/// One calendar day is added to the parsed date: providers show the last
/// day before the bill is due. The result is midnight UTC of that day.
pub fn try_parse_due_date_at(
    text: &str,
    layout: &DateLayout,
    today: NaiveDate,
) -> BillResult<DateTime<Utc>> {
    let mut cleaned = text.trim().to_string();
    for step in &layout.cleanup {
        cleaned = step
            .apply(&cleaned)
            .ok_or_else(|| BillError::ParseFailure(format!("{step:?} did not match {text:?}")))?
            .trim()
            .to_string();
    }
    if cleaned.is_empty() {
        return Err(BillError::ParseFailure(format!(
            "no date left in {text:?} after cleanup"
        )));
    }
    if layout.assume_current_year {
        cleaned = format!("{cleaned} {}", today.year());
    }

    let date = NaiveDate::parse_from_str(&cleaned, &layout.format).map_err(|e| {
        BillError::ParseFailure(format!(
            "{cleaned:?} does not match {:?}: {e}",
            layout.format
        ))
    })?;
    let shifted = date
        .succ_opt()
        .ok_or_else(|| BillError::ParseFailure(format!("{date} has no successor")))?;
    Ok(midnight_utc(shifted))
}

/// Parse a due date; `None` (the sentinel) on any failure.
pub fn parse_due_date_at(text: &str, layout: &DateLayout, today: NaiveDate) -> Option<DateTime<Utc>> {
    match try_parse_due_date_at(text, layout, today) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!("{e}");
            None
        }
    }
}

/// [`parse_due_date_at`] against the local calendar date.
pub fn parse_due_date(text: &str, layout: &DateLayout) -> Option<DateTime<Utc>> {
    parse_due_date_at(text, layout, Local::now().date_naive())
}

/// Next occurrence of `day` of the month on or after `today`.
///
/// Days past the end of a short month fall back to that month's last day.
pub fn next_monthly_due(day: u32, today: NaiveDate) -> Option<DateTime<Utc>> {
    let this_month = clamp_day(today.year(), today.month(), day)?;
    let date = if this_month >= today {
        this_month
    } else {
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        clamp_day(year, month, day)?
    };
    Some(midnight_utc(date))
}

fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day.max(1))
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Whole days from `now` until `date`, rounded toward negative infinity.
pub fn days_until(date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (date - now).num_seconds().div_euclid(Duration::days(1).num_seconds())
}

/// Days until due as presented: stale values below the floor read as zero.
pub fn displayed_days_until(date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let days = days_until(date, now);
    if days < STALE_DAYS_FLOOR {
        0
    } else {
        days
    }
}

/// Due date as `MM/DD/YYYY`, or `"N/A"` for the sentinel.
pub fn format_due_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(|| "N/A".to_string(), |d| d.format("%m/%d/%Y").to_string())
}

/// Days-until column, or `"N/A"` for the sentinel.
pub fn format_days_until(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    date.map_or_else(
        || "N/A".to_string(),
        |d| displayed_days_until(d, now).to_string(),
    )
}
