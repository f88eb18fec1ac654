//! Core data types for bills, the provider ledger, and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelReason;
use crate::workflow::State;

/// One recurring bill as retrieved from a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Amount currently due, in dollars.
    pub amount_due: f64,
    /// Due date. `None` is the sentinel for "unknown / not yet retrieved".
    pub due_date: Option<DateTime<Utc>>,
    /// True only after a fully successful workflow.
    pub retrieved: bool,
}

impl Bill {
    /// A successfully retrieved bill.
    pub fn retrieved(amount_due: f64, due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            amount_due,
            due_date,
            retrieved: true,
        }
    }
}

/// A named slot in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub bill: Bill,
}

/// The ordered collection of provider entries for one run.
///
/// Order defines both execution and display order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<ProviderEntry>,
}

impl Ledger {
    /// Create a ledger with one zero-valued bill per name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|name| ProviderEntry {
                    name: name.into(),
                    bill: Bill::default(),
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[ProviderEntry] {
        &self.entries
    }

    /// Look up a bill by provider name.
    pub fn get(&self, name: &str) -> Option<&Bill> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.bill)
    }

    /// Replace the bill stored under `name`. Returns false if the name is unknown.
    pub fn record(&mut self, name: &str, bill: Bill) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.bill = bill;
                true
            }
            None => false,
        }
    }

    /// Sum of every entry's amount, retrieved or not.
    pub fn total_due(&self) -> f64 {
        self.entries.iter().map(|e| e.bill.amount_due).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Errors raised inside a workflow.
///
/// None of these cross a workflow boundary: the runner logs them and the
/// affected bill keeps its default values.
#[derive(thiserror::Error, Debug)]
pub enum BillError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("{state} timed out after {timeout_ms}ms waiting for `{selector}`")]
    AuthStepTimeout {
        state: State,
        selector: String,
        timeout_ms: u64,
    },

    #[error("Result not found within {timeout_ms}ms: `{selector}`")]
    ResultTimeout { selector: String, timeout_ms: u64 },

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("One-time code unavailable: {0}")]
    OtpUnavailable(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Cancelled by {0}")]
    Cancelled(CancelReason),
}

/// Convenience result type.
pub type BillResult<T> = Result<T, BillError>;
