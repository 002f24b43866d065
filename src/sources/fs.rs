//! Filesystem access used by source resolution.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerates files below a directory. Paths in and out are relative to
/// the filesystem's own root. Ordering of the result is unspecified.
pub trait FileSystem: Send + Sync {
    /// `Err` with `ErrorKind::NotFound` when `dir` does not exist.
    fn list_files(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>>;
}

/// The real project tree.
#[derive(Debug, Clone)]
pub struct RealFs {
    root: PathBuf,
}

impl RealFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystem for RealFs {
    fn list_files(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        let abs = self.root.join(dir);
        if !abs.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", abs.display()),
            ));
        }

        let walker = WalkDir::new(&abs).max_depth(if recursive { usize::MAX } else { 1 });
        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                let msg = e.to_string();
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other(msg))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(rel);
        }
        Ok(files)
    }
}

/// In-memory tree. Listing returns files in insertion order, which lets
/// tests feed the resolver deliberately shuffled enumerations.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Vec<PathBuf>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        let mut parent = path.parent();
        while let Some(p) = parent {
            self.dirs.insert(p.to_path_buf());
            parent = p.parent();
        }
        self.files.push(path);
        self
    }

    pub fn add_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        let mut current = Some(path.as_path());
        while let Some(p) = current {
            self.dirs.insert(p.to_path_buf());
            current = p.parent();
        }
        self
    }
}

impl FileSystem for MemoryFs {
    fn list_files(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.contains(dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", dir.display()),
            ));
        }
        Ok(self
            .files
            .iter()
            .filter(|f| match f.parent() {
                Some(parent) if recursive => parent.starts_with(dir),
                Some(parent) => parent == dir,
                None => false,
            })
            .cloned()
            .collect())
    }
}
