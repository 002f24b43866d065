//! Build output cleanup.
//!
//! - `fwf clean` - remove the selected configuration's outputs
//! - `fwf clean --target <name>` - remove one target of that configuration
//! - `fwf clean --all` - remove everything under the build directory
//!
//! `probe.lock` is never removed; a running flash or debug session owns it.

use crate::error::{Error, Result, Stage};
use crate::project::Project;
use crate::registry::TargetRegistry;
use crate::toolchain::Configuration;
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanScope<'t> {
    All,
    Configuration(Configuration),
    Target(&'t str, Configuration),
}

/// Removes the outputs in `scope` and returns the paths that were deleted.
pub fn clean(project: &Project, scope: CleanScope<'_>) -> Result<Vec<PathBuf>> {
    let build_dir = &project.build_dir;
    let mut removed = Vec::new();
    match scope {
        CleanScope::All => {
            if build_dir.is_dir() {
                let entries =
                    fs::read_dir(build_dir).map_err(|e| Error::io(Stage::Clean, build_dir, e))?;
                let mut paths: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.file_name().is_none_or(|n| n != "probe.lock"))
                    .collect();
                paths.sort();
                for path in paths {
                    remove(&path)?;
                    removed.push(path);
                }
            }
        }
        CleanScope::Configuration(configuration) => {
            let dir = build_dir.join(configuration.dir_name());
            if dir.exists() {
                remove(&dir)?;
                removed.push(dir);
            }
        }
        CleanScope::Target(name, configuration) => {
            let target = project.registry.require(name)?;
            let dir = TargetRegistry::target_dir(build_dir, &target, configuration);
            if dir.exists() {
                remove(&dir)?;
                removed.push(dir);
            }
        }
    }

    if removed.is_empty() {
        println!("{} Nothing to clean", "!".yellow());
    } else {
        println!("{} Clean complete.", "✓".green());
    }
    Ok(removed)
}

fn remove(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| Error::io(Stage::Clean, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BuildTarget;
    use crate::sources::SourceSet;
    use crate::toolchain::ToolchainProfile;

    fn project(root: &Path) -> Project {
        let mut registry = TargetRegistry::new();
        registry
            .register(BuildTarget::new(
                "fw",
                SourceSet::new(vec![PathBuf::from("main.c")], vec![]),
            ))
            .unwrap();
        registry
            .register(BuildTarget::new(
                "tests",
                SourceSet::new(vec![PathBuf::from("t.c")], vec![]),
            ))
            .unwrap();
        Project::new("p", root, ToolchainProfile::new(), registry)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_clean_target_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let p = project(dir.path());
        touch(&p.build_dir.join("debug/fw/fw.elf"));
        touch(&p.build_dir.join("debug/tests/tests.elf"));

        let removed = clean(&p, CleanScope::Target("fw", Configuration::Debug)).unwrap();
        assert_eq!(removed, vec![p.build_dir.join("debug/fw")]);
        assert!(p.build_dir.join("debug/tests/tests.elf").exists());
    }

    #[test]
    fn test_clean_configuration_keeps_other() {
        let dir = tempfile::tempdir().unwrap();
        let p = project(dir.path());
        touch(&p.build_dir.join("debug/fw/fw.elf"));
        touch(&p.build_dir.join("release/fw/fw.elf"));

        clean(&p, CleanScope::Configuration(Configuration::Release)).unwrap();
        assert!(!p.build_dir.join("release").exists());
        assert!(p.build_dir.join("debug/fw/fw.elf").exists());
    }

    #[test]
    fn test_clean_all_spares_probe_lock() {
        let dir = tempfile::tempdir().unwrap();
        let p = project(dir.path());
        touch(&p.build_dir.join("debug/fw/fw.elf"));
        touch(&p.build_dir.join("probe.lock"));

        let removed = clean(&p, CleanScope::All).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(p.build_dir.join("probe.lock").exists());
        assert!(!p.build_dir.join("debug").exists());
        assert!(clean(&p, CleanScope::All).unwrap().is_empty());
    }

    #[test]
    fn test_clean_unknown_target_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = project(dir.path());
        assert!(clean(&p, CleanScope::Target("nope", Configuration::Debug)).is_err());
    }
}
