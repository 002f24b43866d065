//! `MEMORY { ... }` extraction from GNU ld scripts.

use regex::Regex;
use std::sync::OnceLock;

/// A named memory area with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: String,
    /// Raw attribute string, e.g. `rx` or `xrw`.
    pub attributes: String,
    pub origin: u64,
    pub length: u64,
}

impl MemoryRegion {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.origin && addr < self.origin.saturating_add(self.length)
    }

    /// Non-volatile program storage: named like flash, or readable and
    /// executable but not writable.
    pub fn is_flash(&self) -> bool {
        let name = self.name.to_ascii_uppercase();
        if name.contains("FLASH") || name.contains("ROM") {
            return true;
        }
        let attrs = self.attributes.to_ascii_lowercase();
        !attrs.is_empty() && !attrs.contains('w') && !attrs.starts_with('!')
    }
}

fn region_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)([A-Za-z_][\w.]*)\s*(?:\(\s*(!?[A-Za-z]*)\s*\))?\s*:\s*(?:ORIGIN|org|o)\s*=\s*([^,]+?)\s*,\s*(?:LENGTH|len|l)\s*=\s*([^\n;}]+)",
        )
        .expect("static regex")
    })
}

fn strip_comments(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut rest = script;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Regions in declaration order.
pub fn parse_memory_regions(script: &str) -> Result<Vec<MemoryRegion>, String> {
    let script = strip_comments(script);
    let Some(memory_at) = find_memory_keyword(&script) else {
        return Err("linker script has no MEMORY block".to_string());
    };
    let after = &script[memory_at..];
    let open = after
        .find('{')
        .ok_or_else(|| "MEMORY block is missing '{'".to_string())?;
    let close = after[open..]
        .find('}')
        .ok_or_else(|| "MEMORY block is missing '}'".to_string())?;
    let body = &after[open + 1..open + close];

    let mut regions = Vec::new();
    for caps in region_regex().captures_iter(body) {
        let name = caps[1].to_string();
        let origin = eval_expr(&caps[3]).map_err(|e| format!("region {}: ORIGIN {}", name, e))?;
        let length = eval_expr(&caps[4]).map_err(|e| format!("region {}: LENGTH {}", name, e))?;
        regions.push(MemoryRegion {
            attributes: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            name,
            origin,
            length,
        });
    }
    Ok(regions)
}

fn find_memory_keyword(script: &str) -> Option<usize> {
    let bytes = script.as_bytes();
    let mut from = 0;
    while let Some(pos) = script[from..].find("MEMORY") {
        let at = from + pos;
        let before_ok = at == 0 || !is_ident(bytes[at - 1]);
        let end = at + "MEMORY".len();
        let after_ok = end >= bytes.len() || !is_ident(bytes[end]);
        if before_ok && after_ok {
            return Some(at);
        }
        from = end;
    }
    None
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Sums and differences of literals like `0x08000000`, `512K`, `1M`.
fn eval_expr(expr: &str) -> Result<u64, String> {
    let expr = expr.trim();
    let mut total: i128 = 0;
    let mut sign: i128 = 1;
    let mut term = String::new();

    let flush = |term: &mut String, sign: i128, total: &mut i128| -> Result<(), String> {
        let t = term.trim();
        if t.is_empty() {
            return Err(format!("'{}' is not a number", expr));
        }
        *total += sign * parse_literal(t)? as i128;
        term.clear();
        Ok(())
    };

    for c in expr.chars() {
        match c {
            '+' | '-' if !term.trim().is_empty() => {
                flush(&mut term, sign, &mut total)?;
                sign = if c == '-' { -1 } else { 1 };
            }
            _ => term.push(c),
        }
    }
    flush(&mut term, sign, &mut total)?;

    if total < 0 {
        return Err(format!("'{}' evaluates below zero", expr));
    }
    u64::try_from(total).map_err(|_| format!("'{}' overflows", expr))
}

fn parse_literal(t: &str) -> Result<u64, String> {
    let (digits, multiplier) = match t.chars().last() {
        Some('K') | Some('k') => (&t[..t.len() - 1], 1024u64),
        Some('M') | Some('m') => (&t[..t.len() - 1], 1024 * 1024),
        _ => (t, 1),
    };
    let digits = digits.trim();
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        digits.parse::<u64>()
    }
    .map_err(|_| format!("'{}' is not a number", t))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("'{}' overflows", t))
}
