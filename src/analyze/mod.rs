//! Artifact size and symbol analysis.
//!
//! Runs the size and nm tools against a linked image, buckets sections into
//! flash and RAM, and checks every linker-script region against its
//! capacity. Overflows are warnings: the linker has the final word on
//! whether an image fits, and it reports that as a link error.

pub mod linker_script;
pub mod report;
pub mod sections;

pub use linker_script::{MemoryRegion, parse_memory_regions};
pub use sections::{MemoryClass, SectionSize, SizeReport, SymbolReport, SymbolSize};

use crate::error::{Error, Result, Stage, Warning};
use crate::process::{Invocation, ProcessRunner};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Fill level of one linker-script region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionUsage {
    pub name: String,
    pub origin: u64,
    pub capacity: u64,
    pub used: u64,
    /// `used / capacity * 100`, rounded to two decimals.
    pub percent: f64,
}

impl RegionUsage {
    pub fn exceeded(&self) -> bool {
        self.used > self.capacity
    }
}

/// Percentage rounded half away from zero to two decimals.
pub fn percent_of(used: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return if used == 0 { 0.0 } else { f64::INFINITY };
    }
    (used as f64 / capacity as f64 * 100.0 * 100.0).round() / 100.0
}

/// Everything learned about one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub size: SizeReport,
    pub symbols: SymbolReport,
    pub regions: Vec<RegionUsage>,
    /// SHA-256 of the artifact bytes.
    pub digest: String,
    pub warnings: Vec<Warning>,
}

/// Per-region usage. Sections are charged to the region holding their run
/// address; initialised data is additionally charged to the first flash
/// region for its load image.
pub fn region_usage(report: &SizeReport, regions: &[MemoryRegion]) -> Vec<RegionUsage> {
    let load_region = regions.iter().position(|r| r.is_flash());
    regions
        .iter()
        .enumerate()
        .map(|(idx, region)| {
            let mut used: u64 = report
                .sections
                .iter()
                .filter(|s| s.class != MemoryClass::None && region.contains(s.addr))
                .map(|s| s.size)
                .sum();
            if Some(idx) == load_region {
                used += report
                    .sections
                    .iter()
                    .filter(|s| s.class == MemoryClass::FlashAndRam && !region.contains(s.addr))
                    .map(|s| s.size)
                    .sum::<u64>();
            }
            RegionUsage {
                name: region.name.clone(),
                origin: region.origin,
                capacity: region.length,
                used,
                percent: percent_of(used, region.length),
            }
        })
        .collect()
}

pub struct Analyzer<'a> {
    runner: &'a dyn ProcessRunner,
    size_tool: String,
    nm_tool: String,
    linker_script: PathBuf,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        size_tool: impl Into<String>,
        nm_tool: impl Into<String>,
        linker_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            size_tool: size_tool.into(),
            nm_tool: nm_tool.into(),
            linker_script: linker_script.into(),
        }
    }

    pub fn regions(&self) -> Result<Vec<MemoryRegion>> {
        let script = fs::read_to_string(&self.linker_script)
            .map_err(|e| Error::io(Stage::Analyze, &self.linker_script, e))?;
        parse_memory_regions(&script).map_err(|detail| Error::Analysis {
            detail: format!("{}: {}", self.linker_script.display(), detail),
        })
    }

    pub fn analyze(&self, artifact: &Path) -> Result<Analysis> {
        let bytes = fs::read(artifact).map_err(|e| Error::io(Stage::Analyze, artifact, e))?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        let regions = self.regions()?;

        let size_out = self.run_tool(
            Invocation::new(&self.size_tool)
                .args(["-A", "-d"])
                .path_arg(artifact),
        )?;
        let raw = sections::parse_size_output(&size_out).map_err(|detail| Error::Analysis {
            detail: format!("{}: {}", self.size_tool, detail),
        })?;
        let size = SizeReport::from_sections(raw, &regions);

        let nm_out = self.run_tool(
            Invocation::new(&self.nm_tool)
                .args(["--print-size", "--size-sort", "--radix=d"])
                .path_arg(artifact),
        )?;
        let symbols = sections::parse_nm_output(&nm_out);

        let usage = region_usage(&size, &regions);
        let warnings = usage
            .iter()
            .filter(|u| u.exceeded())
            .map(|u| Warning::SizeExceeded {
                region: u.name.clone(),
                used: u.used,
                capacity: u.capacity,
            })
            .collect();

        Ok(Analysis {
            size,
            symbols,
            regions: usage,
            digest,
            warnings,
        })
    }

    fn run_tool(&self, invocation: Invocation) -> Result<String> {
        let out = self.runner.run(&invocation).map_err(|source| Error::Tool {
            stage: Stage::Analyze,
            program: invocation.program.clone(),
            source,
        })?;
        if !out.success() {
            return Err(Error::Analysis {
                detail: format!(
                    "{} exited with code {}:\n{}",
                    invocation.program,
                    out.code,
                    out.combined()
                ),
            });
        }
        Ok(out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str, attrs: &str, origin: u64, length: u64) -> MemoryRegion {
        MemoryRegion {
            name: name.into(),
            attributes: attrs.into(),
            origin,
            length,
        }
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent_of(1, 3), 33.33);
        assert_eq!(percent_of(2, 3), 66.67);
        assert_eq!(percent_of(9672, 1024 * 1024), 0.92);
        assert_eq!(percent_of(0, 0), 0.0);
        assert!(percent_of(1, 0).is_infinite());
    }

    #[test]
    fn test_region_usage_charges_data_to_flash() {
        let regions = vec![
            region("RAM", "xrw", 0x2000_0000, 0x1000),
            region("FLASH", "rx", 0x0800_0000, 0x100),
        ];
        let report = SizeReport::from_sections(
            vec![
                (".text".into(), 0xf0, 0x0800_0000),
                (".data".into(), 0x20, 0x2000_0000),
                (".bss".into(), 0x40, 0x2000_0020),
                (".comment".into(), 0x99, 0),
            ],
            &regions,
        );
        let usage = region_usage(&report, &regions);
        assert_eq!(usage[0].used, 0x60);
        assert_eq!(usage[1].used, 0x110);
        assert!(usage[1].exceeded());
        assert!(!usage[0].exceeded());
        assert_eq!(usage[1].percent, percent_of(0x110, 0x100));
    }
}
