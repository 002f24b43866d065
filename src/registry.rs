//! Named build targets.
//!
//! A target binds one resolved [`SourceSet`] to an output name. The test
//! firmware is registered exactly like the main firmware; nothing downstream
//! branches on which one it got.

use crate::error::{Error, Result};
use crate::sources::SourceSet;
use crate::toolchain::Configuration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    pub source_set: SourceSet,
    pub output_name: String,
    pub extra_link_libs: Vec<String>,
    /// Target-local defines; ABI flags never live here.
    pub defines: Vec<String>,
}

impl BuildTarget {
    pub fn new(name: impl Into<String>, source_set: SourceSet) -> Self {
        let name = name.into();
        Self {
            output_name: name.clone(),
            name,
            source_set,
            extra_link_libs: Vec::new(),
            defines: Vec::new(),
        }
    }

    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    pub fn with_libs(mut self, libs: Vec<String>) -> Self {
        self.extra_link_libs = libs;
        self
    }

    pub fn with_defines(mut self, defines: Vec<String>) -> Self {
        self.defines = defines;
        self
    }
}

/// Registered targets. Entries are shared and never mutated after insert.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Arc<BuildTarget>>,
    order: Vec<String>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: BuildTarget) -> Result<Arc<BuildTarget>> {
        if target.name.trim().is_empty() {
            return Err(Error::config("target name must not be empty"));
        }
        if self.targets.contains_key(&target.name) {
            return Err(Error::config(format!(
                "target '{}' is already registered",
                target.name
            )));
        }
        let name = target.name.clone();
        let target = Arc::new(target);
        self.targets.insert(name.clone(), Arc::clone(&target));
        self.order.push(name);
        Ok(target)
    }

    pub fn get(&self, name: &str) -> Option<Arc<BuildTarget>> {
        self.targets.get(name).cloned()
    }

    /// Lookup that reports the known names on a miss.
    pub fn require(&self, name: &str) -> Result<Arc<BuildTarget>> {
        self.get(name).ok_or_else(|| {
            Error::config(format!(
                "unknown target '{}' (known: {})",
                name,
                self.order.join(", ")
            ))
        })
    }

    /// Targets in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<BuildTarget>> {
        self.order.iter().filter_map(|n| self.targets.get(n))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// First registered target, used when the command line names none.
    pub fn default_target(&self) -> Option<Arc<BuildTarget>> {
        self.order.first().and_then(|n| self.get(n))
    }

    /// `<build>/<configuration>/<target>`
    pub fn target_dir(build_dir: &Path, target: &BuildTarget, configuration: Configuration) -> PathBuf {
        build_dir.join(configuration.dir_name()).join(&target.name)
    }

    /// `<build>/<configuration>/<target>/<output>.elf`; Release and Debug
    /// never share a path.
    pub fn artifact_path(
        build_dir: &Path,
        target: &BuildTarget,
        configuration: Configuration,
    ) -> PathBuf {
        Self::target_dir(build_dir, target, configuration)
            .join(format!("{}.elf", target.output_name))
    }
}
