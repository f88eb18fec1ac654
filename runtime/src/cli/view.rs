//! Live status table on stdout.

use std::io::Write;

use billburner::{status_rows, Ledger, StatusView};
use chrono::{DateTime, Utc};

use super::output::{format_table, Styled, CLEAR_SCREEN};

/// Redraws the whole table after each provider.
pub struct TerminalView {
    styled: Styled,
    clear: bool,
}

impl TerminalView {
    /// Clear the screen between renders only when stdout is a terminal.
    pub fn new() -> Self {
        Self {
            styled: Styled::new(),
            clear: super::output::atty_stdout(),
        }
    }

    /// The table as it would be printed for `ledger`.
    pub fn frame(&self, ledger: &Ledger, now: DateTime<Utc>) -> String {
        let table = format_table(&status_rows(ledger, now), &self.styled);
        if self.clear {
            format!("{CLEAR_SCREEN}\n{table}")
        } else {
            format!("\n{table}")
        }
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusView for TerminalView {
    fn render(&mut self, ledger: &Ledger, now: DateTime<Utc>) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(self.frame(ledger, now).as_bytes());
        let _ = stdout.flush();
    }
}

/// Discards every render; used with `--json`.
pub struct SilentView;

impl StatusView for SilentView {
    fn render(&mut self, _ledger: &Ledger, _now: DateTime<Utc>) {}
}
