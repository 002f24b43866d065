//! Terminal tables.
//!
//! `Table` draws Unicode box tables sized to the terminal. Numeric columns
//! can be right-aligned so byte counts and percentages line up.
//!
//! ```rust
//! use fwforge::ui::Table;
//! let mut table = Table::new(&["Region", "Used"]);
//! table.add_row(vec!["FLASH".to_string(), "9.3 KiB".to_string()]);
//! table.print();
//! ```

use colored::*;
use std::cmp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

pub struct Table {
    headers: Vec<String>,
    align: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            align: vec![Align::Left; headers.len()],
            rows: Vec::new(),
        }
    }

    /// Right-aligns the given columns.
    pub fn right_align(mut self, columns: &[usize]) -> Self {
        for &c in columns {
            if let Some(a) = self.align.get_mut(c) {
                *a = Align::Right;
            }
        }
        self
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn print(&self) {
        let (_, term_width) = console::Term::stdout().size();
        print!("{}", self.render(term_width as usize));
    }

    /// The table as text, shrinking the widest columns until it fits
    /// `max_width`.
    pub fn render(&self, max_width: usize) -> String {
        if self.headers.is_empty() {
            return String::new();
        }

        let mut col_widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let len = console::measure_text_width(&sanitize_content(cell));
                col_widths[i] = cmp::max(col_widths[i], len);
            }
        }

        let overhead = 3 + 3 * self.headers.len();
        let available = max_width.saturating_sub(overhead);
        let mut current: usize = col_widths.iter().sum();
        while current > available {
            let Some((idx, &widest)) = col_widths.iter().enumerate().max_by_key(|(_, w)| **w)
            else {
                break;
            };
            if widest <= 8 {
                break;
            }
            col_widths[idx] -= 1;
            current -= 1;
        }

        let sep = |left: &str, mid: &str, right: &str| -> String {
            let inner: Vec<String> = col_widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}\n", left, inner.join(mid), right)
        };

        let mut out = sep("┌", "┬", "┐");
        out.push_str("  │");
        for (i, header) in self.headers.iter().enumerate() {
            let cell = console::truncate_str(header, col_widths[i], "...");
            let pad = col_widths[i].saturating_sub(console::measure_text_width(&cell));
            out.push_str(&format!(" {}{} │", cell.bold(), " ".repeat(pad)));
        }
        out.push('\n');
        out.push_str(&sep("├", "┼", "┤"));

        for row in &self.rows {
            out.push_str("  │");
            for (i, raw) in row.iter().enumerate() {
                let clean = sanitize_content(raw);
                let cell = console::truncate_str(&clean, col_widths[i], "...");
                let pad = " ".repeat(col_widths[i].saturating_sub(console::measure_text_width(&cell)));
                match self.align[i] {
                    Align::Left => out.push_str(&format!(" {}{} │", cell, pad)),
                    Align::Right => out.push_str(&format!(" {}{} │", pad, cell)),
                }
            }
            out.push('\n');
        }
        out.push_str(&sep("└", "┴", "┘"));
        out
    }
}

fn sanitize_content(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

/// `1536` -> `1.5 KiB`
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
