//! Terminal output helpers: colors, symbols and the status table.

use std::io::{IsTerminal, Write};

/// Check if color output is enabled.
pub fn color_enabled() -> bool {
    // https://no-color.org/
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("BILLBURNER_NO_COLOR").is_ok() {
        return false;
    }
    atty_stdout()
}

/// Check if stdout is a TTY.
pub fn atty_stdout() -> bool {
    std::io::stdout().is_terminal()
}

/// JSON output was requested with `--json`.
pub fn is_json() -> bool {
    std::env::var("BILLBURNER_JSON").is_ok()
}

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Clears the screen and homes the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Colored string builder.
pub struct Styled {
    use_color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    /// Never emits escape codes.
    pub fn plain() -> Self {
        Self { use_color: false }
    }

    pub fn ok_sym(&self) -> &str {
        if self.use_color {
            "\x1b[32m\u{2713}\x1b[0m"
        } else {
            "OK"
        }
    }

    pub fn fail_sym(&self) -> &str {
        if self.use_color {
            "\x1b[31m\u{2717}\x1b[0m"
        } else {
            "!!"
        }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

/// Format rows as an aligned table.
///
/// The first row is the header and the last row the totals; both are set
/// off with rules. The first column is left-aligned, the rest right-aligned.
pub fn format_table(rows: &[[String; 4]], s: &Styled) -> String {
    let mut widths = [0usize; 4];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let rule = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("  ");

    let mut out = String::new();
    let last = rows.len().saturating_sub(1);
    for (i, row) in rows.iter().enumerate() {
        if i == last && i > 0 {
            out.push_str(&format!("  {}\n", s.dim(&rule)));
        }
        let line = row
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(col, (cell, width))| {
                if col == 0 {
                    format!("{cell:<width$}")
                } else {
                    format!("{cell:>width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        let line = line.trim_end();
        if i == 0 || i == last {
            out.push_str(&format!("  {}\n", s.bold(line)));
        } else {
            out.push_str(&format!("  {line}\n"));
        }
        if i == 0 {
            out.push_str(&format!("  {}\n", s.dim(&rule)));
        }
    }
    out
}

/// Print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    let _ = writeln!(
        std::io::stdout(),
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: [&str; 4]) -> [String; 4] {
        cells.map(str::to_string)
    }

    #[test]
    fn test_format_table_aligns_columns() {
        let rows = vec![
            row(["Bill Type", "Amount Due ($)", "Due Date", "Days Until Due"]),
            row(["Gas", "40.25", "05/09/2024", "8"]),
            row(["Mortgage", "1250.00", "N/A", "N/A"]),
            row(["Total", "1290.25", "", ""]),
        ];
        let table = format_table(&rows, &Styled::plain());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[0],
            "  Bill Type  Amount Due ($)    Due Date  Days Until Due"
        );
        assert_eq!(
            lines[2],
            "  Gas                 40.25  05/09/2024               8"
        );
        assert_eq!(
            lines[3],
            "  Mortgage          1250.00         N/A             N/A"
        );
        assert!(lines[1].trim().chars().all(|c| c == '-' || c == ' '));
        assert!(lines[4].trim().chars().all(|c| c == '-' || c == ' '));
        assert_eq!(lines[5], "  Total             1290.25");
    }

    #[test]
    fn test_format_table_header_only() {
        let rows = vec![row(["Bill Type", "Amount Due ($)", "Due Date", "Days Until Due"])];
        let table = format_table(&rows, &Styled::plain());
        assert_eq!(table.lines().count(), 2);
    }

    #[test]
    fn test_plain_styles_have_no_escapes() {
        let s = Styled::plain();
        assert_eq!(s.bold("Total"), "Total");
        assert_eq!(s.ok_sym(), "OK");
        assert_eq!(s.fail_sym(), "!!");
        assert!(!s.dim("---").contains('\x1b'));
    }
}
