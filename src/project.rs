//! A loaded firmware project: manifest, toolchain profile and target
//! registry, all resolved against one project root.

use crate::config::{DebugConfig, FlashConfig, FwConfig, ScriptsConfig};
use crate::error::{Error, Result, Warning};
use crate::probe::Probe;
use crate::registry::{BuildTarget, TargetRegistry};
use crate::sources::{FileSystem, RealFs, SourceResolver, SourceRoot};
use crate::toolchain::ToolchainProfile;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST: &str = "fw.toml";
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 20;

/// Reads and parses `fw.toml` from `root`.
pub fn load_config(root: &Path) -> anyhow::Result<FwConfig> {
    let path = root.join(MANIFEST);
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "{} not found in {}.\n\n\
            💡 Tip: run fwf from the firmware project root, next to {}.",
            MANIFEST,
            root.display(),
            MANIFEST
        ));
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| {
        format!(
            "Failed to parse {} - check for syntax errors and unknown keys",
            path.display()
        )
    })
}

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    /// Absolute.
    pub build_dir: PathBuf,
    pub profile: ToolchainProfile,
    pub registry: TargetRegistry,
    pub jobs: usize,
    pub max_diagnostics: usize,
    pub scripts: ScriptsConfig,
    pub flash: FlashConfig,
    pub debug: DebugConfig,
    /// Resolution warnings gathered while registering targets.
    pub warnings: Vec<Warning>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        profile: ToolchainProfile,
        registry: TargetRegistry,
    ) -> Self {
        let root = root.into();
        Self {
            name: name.into(),
            build_dir: root.join("build"),
            root,
            profile,
            registry,
            jobs: default_jobs(),
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            scripts: ScriptsConfig::default(),
            flash: FlashConfig::default(),
            debug: DebugConfig::default(),
            warnings: Vec::new(),
        }
    }

    /// Loads `fw.toml` and resolves every target against the real tree.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = load_config(root)?;
        let fs = RealFs::new(root);
        Ok(Self::from_config(root, &config, &fs)?)
    }

    pub fn from_config(root: &Path, config: &FwConfig, fs: &dyn FileSystem) -> Result<Self> {
        let profile = ToolchainProfile::from_config(config)?;
        let resolver = SourceResolver::new(fs);

        let mut registry = TargetRegistry::new();
        let mut warnings = Vec::new();
        for t in &config.targets {
            let roots: Vec<SourceRoot> = t
                .sources
                .iter()
                .map(|s| SourceRoot::new(&s.pattern, s.recursive))
                .collect();
            let include_dirs: Vec<PathBuf> = t.include_dirs.iter().map(PathBuf::from).collect();
            let resolution = resolver.resolve(&t.name, &roots, &include_dirs)?;
            warnings.extend(resolution.warnings);

            let mut target = BuildTarget::new(&t.name, resolution.source_set)
                .with_libs(t.libs.clone())
                .with_defines(t.defines.clone());
            if let Some(output) = &t.output {
                target = target.with_output_name(output);
            }
            registry.register(target)?;
        }

        let mut project = Self::new(&config.project.name, root, profile, registry);
        if let Some(dir) = &config.project.build_dir {
            project.build_dir = root.join(dir);
        }
        if let Some(jobs) = config.project.jobs {
            if jobs == 0 {
                return Err(Error::config("[project].jobs must be at least 1"));
            }
            project.jobs = jobs;
        }
        if let Some(max) = config.project.max_diagnostics {
            project.max_diagnostics = max;
        }
        project.scripts = config.scripts.clone().unwrap_or_default();
        project.flash = config.flash.clone().unwrap_or_default();
        project.debug = config.debug.clone().unwrap_or_default();
        project.warnings = warnings;
        Ok(project)
    }

    pub fn with_build_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.build_dir = self.root.join(dir);
        self
    }

    /// Probe handle shared by `flash` and `debug`, excluding other `fwf`
    /// processes through `<build>/probe.lock`.
    pub fn probe(&self) -> Probe {
        Probe::with_lock_file(self.build_dir.join("probe.lock"))
    }

    /// Linker script location on disk.
    pub fn linker_script(&self) -> Option<PathBuf> {
        self.profile.linker_script.as_ref().map(|p| self.root.join(p))
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
