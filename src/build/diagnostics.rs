use crate::error::CompileFailure;
use colored::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn error_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([^:\n]+):(\d+):(?:(\d+):)?\s*(?:fatal error|error):\s*(.+)$")
            .expect("static regex")
    })
}

/// Distinct error diagnostics across `failures`, in failure order, at most
/// `limit` of them. A failure whose output holds no recognisable error line
/// contributes its first non-empty line instead, so every failing unit is
/// represented. When the bound cuts the list a final summary line says how
/// many were left out.
pub fn collect(failures: &[CompileFailure], limit: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut all = Vec::new();
    for failure in failures {
        let mut found = false;
        for m in error_line().find_iter(&failure.stderr) {
            found = true;
            let line = m.as_str().trim_end().to_string();
            if seen.insert(line.clone()) {
                all.push(line);
            }
        }
        if !found {
            let line = failure
                .stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| format!("{}: {}", failure.source.display(), l))
                .unwrap_or_else(|| {
                    format!(
                        "{}: compiler exited with code {}",
                        failure.source.display(),
                        failure.exit_code
                    )
                });
            if seen.insert(line.clone()) {
                all.push(line);
            }
        }
    }
    if all.len() > limit {
        let hidden = all.len() - limit;
        all.truncate(limit);
        all.push(format!("... and {} more error(s)", hidden));
    }
    all
}

/// A short suggestion for well-known toolchain failures.
pub fn hint(output: &str) -> Option<String> {
    if output.contains("will not fit in region") || output.contains("overflowed by") {
        return Some(format!(
            "The image does not fit in a {} region.\nTry the {} configuration or drop unused code.",
            "MEMORY".bold().yellow(),
            "release".bold().green()
        ));
    }

    if output.contains("undefined reference to `main'") {
        return Some(format!(
            "No {} was linked. Check the target's {} roots.",
            "main()".bold().yellow(),
            "sources".bold().yellow()
        ));
    }

    if output.contains("undefined reference to") {
        return Some(format!(
            "It looks like a {} error.\nA source root or an entry in {} is probably missing.",
            "Linker".bold().red(),
            "libs".bold().yellow()
        ));
    }

    if output.contains("fatal error: ") && output.contains("No such file or directory") {
        return Some(format!(
            "It looks like a {} error.\nCheck the target's {} (order matters) in fw.toml.",
            "Missing Header".bold().red(),
            "include_dirs".bold().yellow()
        ));
    }

    None
}
