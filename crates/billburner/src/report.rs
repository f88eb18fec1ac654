//! Status table rows for the terminal view.

use chrono::{DateTime, Utc};

use crate::normalize::{format_days_until, format_due_date};
use crate::types::Ledger;

pub const HEADER: [&str; 4] = ["Bill Type", "Amount Due ($)", "Due Date", "Days Until Due"];

/// Header, one row per entry in ledger order, then a totals row.
pub fn status_rows(ledger: &Ledger, now: DateTime<Utc>) -> Vec<[String; 4]> {
    let mut rows = Vec::with_capacity(ledger.len() + 2);
    rows.push(HEADER.map(str::to_string));
    for entry in ledger.entries() {
        rows.push([
            entry.name.clone(),
            format!("{:.2}", entry.bill.amount_due),
            format_due_date(entry.bill.due_date),
            format_days_until(entry.bill.due_date, now),
        ]);
    }
    rows.push([
        "Total".to_string(),
        format!("{:.2}", ledger.total_due()),
        String::new(),
        String::new(),
    ]);
    rows
}

/// Receives the ledger after every provider completes.
pub trait StatusView: Send {
    fn render(&mut self, ledger: &Ledger, now: DateTime<Utc>);
}
