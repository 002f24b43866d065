//! Plain-text renderings of an [`Analysis`].
//!
//! Output is fixed-width and ordered the same way on every run so the files
//! can be committed or diffed between builds.

use super::{Analysis, percent_of};
use std::fmt::Write;
use std::path::Path;

pub fn render_size_report(artifact: &Path, analysis: &Analysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# size report: {}", artifact.display());
    let _ = writeln!(out, "# sha256: {}", analysis.digest);
    let _ = writeln!(out);

    let name_w = analysis
        .size
        .sections
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("section".len()))
        .max()
        .unwrap_or(7);
    let region_w = analysis
        .regions
        .iter()
        .map(|r| r.name.len())
        .chain(std::iter::once("region".len()))
        .max()
        .unwrap_or(6);

    let _ = writeln!(
        out,
        "{:<name_w$}  {:>10}  {:<region_w$}  {:>8}",
        "section", "bytes", "region", "percent"
    );
    for s in &analysis.size.sections {
        let capacity = s
            .region
            .as_ref()
            .and_then(|name| analysis.regions.iter().find(|r| &r.name == name))
            .map(|r| r.capacity);
        let (region, percent) = match (&s.region, capacity) {
            (Some(name), Some(cap)) => (name.as_str(), format!("{:.2}", percent_of(s.size, cap))),
            _ => ("-", "-".to_string()),
        };
        let _ = writeln!(
            out,
            "{:<name_w$}  {:>10}  {:<region_w$}  {:>8}",
            s.name, s.size, region, percent
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<region_w$}  {:>10}  {:>10}  {:>8}",
        "region", "used", "capacity", "percent"
    );
    for r in &analysis.regions {
        let _ = writeln!(
            out,
            "{:<region_w$}  {:>10}  {:>10}  {:>8.2}{}",
            r.name,
            r.used,
            r.capacity,
            r.percent,
            if r.exceeded() { "  OVERFLOW" } else { "" }
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "total flash bytes: {}", analysis.size.total_flash_bytes);
    let _ = writeln!(out, "total ram bytes: {}", analysis.size.total_ram_bytes);
    out
}

pub fn render_symbol_report(artifact: &Path, analysis: &Analysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# symbol report: {}", artifact.display());
    let _ = writeln!(out, "{:>10}  symbol", "bytes");
    for s in &analysis.symbols.symbols {
        let _ = writeln!(out, "{:>10}  {}", s.size, s.name);
    }
    out
}
