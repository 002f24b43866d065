//! Section and symbol tables from `size -A -d` and `nm --print-size`.

use super::linker_script::MemoryRegion;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    Flash,
    Ram,
    /// Initialised data: stored in flash, copied to RAM at startup.
    FlashAndRam,
    /// Not loaded on the target (debug info, comments, attributes).
    None,
}

impl MemoryClass {
    pub fn counts_as_flash(&self) -> bool {
        matches!(self, MemoryClass::Flash | MemoryClass::FlashAndRam)
    }

    pub fn counts_as_ram(&self) -> bool {
        matches!(self, MemoryClass::Ram | MemoryClass::FlashAndRam)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSize {
    pub name: String,
    pub size: u64,
    pub addr: u64,
    pub class: MemoryClass,
    /// Region holding the section's run address, if any.
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SizeReport {
    /// In the order the ELF lists them.
    pub sections: Vec<SectionSize>,
    pub total_flash_bytes: u64,
    pub total_ram_bytes: u64,
}

impl SizeReport {
    pub fn from_sections(raw: Vec<(String, u64, u64)>, regions: &[MemoryRegion]) -> Self {
        let sections: Vec<SectionSize> = raw
            .into_iter()
            .map(|(name, size, addr)| {
                let class = classify(&name, addr, regions);
                let region = if class == MemoryClass::None {
                    None
                } else {
                    regions
                        .iter()
                        .find(|r| r.contains(addr))
                        .map(|r| r.name.clone())
                };
                SectionSize {
                    name,
                    size,
                    addr,
                    class,
                    region,
                }
            })
            .collect();
        let total_flash_bytes = sections
            .iter()
            .filter(|s| s.class.counts_as_flash())
            .map(|s| s.size)
            .sum();
        let total_ram_bytes = sections
            .iter()
            .filter(|s| s.class.counts_as_ram())
            .map(|s| s.size)
            .sum();
        Self {
            sections,
            total_flash_bytes,
            total_ram_bytes,
        }
    }

    pub fn section_map(&self) -> BTreeMap<String, u64> {
        self.sections
            .iter()
            .map(|s| (s.name.clone(), s.size))
            .collect()
    }
}

fn is_non_alloc(name: &str) -> bool {
    name == ".comment"
        || name.starts_with(".debug")
        || name.starts_with(".stab")
        || name.ends_with(".attributes")
        || name.starts_with(".note.GNU-stack")
}

/// Memory class of one section. `.data` is special: it occupies RAM at
/// run time and flash for its initial image.
pub fn classify(name: &str, addr: u64, regions: &[MemoryRegion]) -> MemoryClass {
    if is_non_alloc(name) {
        return MemoryClass::None;
    }
    if name.starts_with(".data") || name == ".ramfunc" || name == ".RamFunc" {
        return MemoryClass::FlashAndRam;
    }
    if let Some(region) = regions.iter().find(|r| r.contains(addr)) {
        return if region.is_flash() {
            MemoryClass::Flash
        } else {
            MemoryClass::Ram
        };
    }
    const RAM_PREFIXES: &[&str] = &[".bss", ".noinit", "._user_heap_stack", ".heap", ".stack"];
    const FLASH_PREFIXES: &[&str] = &[
        ".isr_vector",
        ".vectors",
        ".text",
        ".rodata",
        ".ARM",
        ".preinit_array",
        ".init_array",
        ".fini_array",
    ];
    if RAM_PREFIXES.iter().any(|p| name.starts_with(p)) {
        MemoryClass::Ram
    } else if FLASH_PREFIXES.iter().any(|p| name.starts_with(p)) {
        MemoryClass::Flash
    } else {
        MemoryClass::None
    }
}

/// Parses System V output (`size -A -d`) into `(name, size, addr)`.
pub fn parse_size_output(output: &str) -> Result<Vec<(String, u64, u64)>, String> {
    let mut sections = Vec::new();
    let mut in_table = false;
    for line in output.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if !in_table {
            if cols.first() == Some(&"section") {
                in_table = true;
            }
            continue;
        }
        match cols.as_slice() {
            ["Total", ..] => break,
            [name, size, addr] => {
                let size = parse_num(size).ok_or_else(|| format!("bad size in line '{}'", line))?;
                let addr = parse_num(addr).ok_or_else(|| format!("bad address in line '{}'", line))?;
                sections.push((name.to_string(), size, addr));
            }
            [] => continue,
            _ => return Err(format!("unexpected line in size output: '{}'", line)),
        }
    }
    if !in_table {
        return Err("size output has no section table (expected `size -A`)".to_string());
    }
    Ok(sections)
}

fn parse_num(s: &str) -> Option<u64> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSize {
    pub name: String,
    pub size: u64,
}

/// Symbols largest first, ties broken by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolReport {
    pub symbols: Vec<SymbolSize>,
}

impl SymbolReport {
    pub fn new(mut symbols: Vec<SymbolSize>) -> Self {
        symbols.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
        Self { symbols }
    }

    pub fn top(&self, n: usize) -> &[SymbolSize] {
        &self.symbols[..n.min(self.symbols.len())]
    }
}

/// Parses `nm --print-size --radix=d` output. Lines without a size are
/// undefined or absolute symbols and are skipped.
pub fn parse_nm_output(output: &str) -> SymbolReport {
    let symbols = output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            match cols.as_slice() {
                [_addr, size, _kind, name @ ..] if !name.is_empty() => {
                    let size = parse_num(size)?;
                    (size > 0).then(|| SymbolSize {
                        name: name.join(" "),
                        size,
                    })
                }
                _ => None,
            }
        })
        .collect();
    SymbolReport::new(symbols)
}
