//! Terminal output.
//!
//! Everything a run prints to the console goes through here: colored status
//! lines, severity classification for replayed build logs, and the end-of-run
//! summary table.
//!
//! ## Example
//!
//! ```rust
//! use cxmatrix::ui::{LogRules, Severity};
//!
//! let rules = LogRules::standard();
//! assert_eq!(rules.classify("main.cpp:3: error: expected ';'"), Severity::Error);
//! assert_eq!(rules.classify("all good"), Severity::Default);
//! ```

use colored::*;
use std::cmp;
use std::io::{self, Write};

/// How a console line is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Default,
    Error,
    Warning,
    Success,
    Banner,
}

pub fn paint(text: &str, severity: Severity) -> ColoredString {
    match severity {
        Severity::Default => text.normal(),
        Severity::Error => text.red(),
        Severity::Warning => text.yellow(),
        Severity::Success => text.green(),
        Severity::Banner => text.magenta(),
    }
}

pub fn print_line(out: &mut dyn Write, text: &str, severity: Severity) -> io::Result<()> {
    writeln!(out, "{}", paint(text, severity))
}

/// Ordered substring rules. The first rule whose pattern occurs in a line
/// decides its severity; lines matching nothing are [`Severity::Default`].
#[derive(Debug, Clone)]
pub struct LogRules {
    rules: Vec<(String, Severity)>,
}

impl LogRules {
    pub fn new(rules: Vec<(String, Severity)>) -> Self {
        Self { rules }
    }

    /// MSVC (`error C2065`), GCC/Clang (`error:`, `warning:`) and test-runner
    /// (`FAILED`) markers.
    pub fn standard() -> Self {
        Self::new(vec![
            ("error C".to_string(), Severity::Error),
            ("error:".to_string(), Severity::Error),
            ("FAILED".to_string(), Severity::Error),
            ("warning:".to_string(), Severity::Warning),
        ])
    }

    pub fn classify(&self, line: &str) -> Severity {
        self.rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Default)
    }
}

impl Default for LogRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Box-drawn table sized to the terminal.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are dropped.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.headers.is_empty() {
            return Ok(());
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let visible = console::measure_text_width(cell);
                widths[i] = cmp::max(widths[i], visible);
            }
        }
        shrink_to_terminal(&mut widths);

        let sep = |left: &str, mid: &str, right: &str| -> String {
            let inner: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}", left, inner.join(mid), right)
        };

        writeln!(out, "{}", sep("┌", "┬", "┐"))?;
        let header_cells: Vec<String> = self
            .headers
            .iter()
            .map(|h| h.bold().to_string())
            .collect();
        write_row(out, &header_cells, &widths)?;
        writeln!(out, "{}", sep("├", "┼", "┤"))?;
        for row in &self.rows {
            write_row(out, row, &widths)?;
        }
        writeln!(out, "{}", sep("└", "┴", "┘"))
    }
}

fn write_row(out: &mut dyn Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
    write!(out, "  │")?;
    for (cell, &width) in cells.iter().zip(widths) {
        let truncated = console::truncate_str(cell, width, "...");
        let padding = width.saturating_sub(console::measure_text_width(&truncated));
        write!(out, " {}{} │", truncated, " ".repeat(padding))?;
    }
    writeln!(out)
}

// Narrow the widest column one char at a time until the table fits, never
// below 8 chars.
fn shrink_to_terminal(widths: &mut [usize]) {
    let term = console::Term::stdout();
    let Some((_rows, cols)) = term.size_checked() else {
        return;
    };
    let overhead = 3 + 3 * widths.len();
    let available = (cols as usize).saturating_sub(overhead);

    let mut total: usize = widths.iter().sum();
    while total > available {
        let Some((idx, &widest)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
            return;
        };
        if widest <= 8 {
            return;
        }
        widths[idx] -= 1;
        total -= 1;
    }
}
