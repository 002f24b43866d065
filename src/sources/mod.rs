//! Source set resolution.
//!
//! Turns declared `(pattern, recursive)` roots into an immutable, sorted set
//! of translation units. Include directories are taken from the declaration
//! only and keep their declared order: vendor trees ship duplicate headers
//! and the first matching directory has to win.

pub mod fs;

pub use fs::{FileSystem, MemoryFs, RealFs};

use crate::error::{Error, Result, Stage, Warning};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions picked up when a root names a bare directory.
const DEFAULT_EXTENSIONS: &[&str] = &["c", "cpp", "cc", "cxx", "s", "S"];

/// One declared source root, e.g. `Drivers/STM32F4xx_HAL_Driver/Src/*.c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub pattern: String,
    pub recursive: bool,
}

impl SourceRoot {
    pub fn new(pattern: impl Into<String>, recursive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            recursive,
        }
    }

    /// Splits into the directory to enumerate, the file-name matcher and
    /// whether to descend. A root naming one file never descends.
    fn split(&self) -> Result<(PathBuf, Regex, bool)> {
        let pattern = self.pattern.trim_end_matches('/');
        let (dir, glob, recursive) = match pattern.rsplit_once('/') {
            Some((dir, last)) if has_glob(last) => {
                (dir.to_string(), last.to_string(), self.recursive)
            }
            None if has_glob(pattern) => (String::new(), pattern.to_string(), self.recursive),
            Some((dir, last)) if is_source_name(last) => (dir.to_string(), last.to_string(), false),
            None if is_source_name(pattern) => (String::new(), pattern.to_string(), false),
            _ => (
                pattern.to_string(),
                format!("*.{{{}}}", DEFAULT_EXTENSIONS.join(",")),
                self.recursive,
            ),
        };
        if has_glob(&dir) {
            return Err(Error::Configuration {
                stage: Stage::Resolve,
                detail: format!(
                    "source root '{}': wildcards are only allowed in the file name; use recursive = true",
                    self.pattern
                ),
            });
        }
        let regex = glob_to_regex(&glob).map_err(|e| Error::Configuration {
            stage: Stage::Resolve,
            detail: format!("source root '{}': {}", self.pattern, e),
        })?;
        Ok((normalize(Path::new(&dir)), regex, recursive))
    }
}

fn is_source_name(s: &str) -> bool {
    s.rsplit_once('.')
        .is_some_and(|(_, ext)| DEFAULT_EXTENSIONS.contains(&ext))
}

fn has_glob(s: &str) -> bool {
    s.contains(['*', '?', '{'])
}

/// `*.{c,s}` -> `^[^/]*\.(?:c|s)$`
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let mut re = String::from("^");
    let mut in_group = false;
    for c in glob.chars() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' if !in_group => {
                in_group = true;
                re.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                re.push(')');
            }
            ',' if in_group => re.push('|'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

/// Immutable, deterministically ordered inputs of one target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSet {
    files: Vec<PathBuf>,
    include_dirs: Vec<PathBuf>,
}

impl SourceSet {
    pub fn new(files: impl IntoIterator<Item = PathBuf>, include_dirs: Vec<PathBuf>) -> Self {
        let files: BTreeSet<PathBuf> = files.into_iter().collect();
        Self {
            files: files.into_iter().collect(),
            include_dirs,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for f in &self.files {
            hasher.update(b"f\0");
            hasher.update(f.to_string_lossy().as_bytes());
        }
        for d in &self.include_dirs {
            hasher.update(b"i\0");
            hasher.update(d.to_string_lossy().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// A resolved set plus the roots that turned up empty.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub source_set: SourceSet,
    pub warnings: Vec<Warning>,
}

pub struct SourceResolver<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> SourceResolver<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Expand `roots` into files. An empty or missing root is a warning,
    /// not an error.
    pub fn resolve(
        &self,
        target: &str,
        roots: &[SourceRoot],
        include_dirs: &[PathBuf],
    ) -> Result<Resolution> {
        let mut files = BTreeSet::new();
        let mut warnings = Vec::new();

        for root in roots {
            let (dir, matcher, recursive) = root.split()?;
            let listed = match self.fs.list_files(&dir, recursive) {
                Ok(listed) => listed,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(Error::io(Stage::Resolve, dir, e)),
            };

            let mut matched = 0usize;
            for path in listed {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if matcher.is_match(name) {
                    matched += 1;
                    files.insert(normalize(&path));
                }
            }
            if matched == 0 {
                warnings.push(Warning::SourceResolution {
                    target: target.to_string(),
                    pattern: root.pattern.clone(),
                });
            }
        }

        Ok(Resolution {
            source_set: SourceSet::new(files, include_dirs.to_vec()),
            warnings,
        })
    }
}

/// Drops `.` components so `./Core/Src/a.c` and `Core/Src/a.c` collapse.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}
