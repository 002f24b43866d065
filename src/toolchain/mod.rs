//! Cross-compilation toolchain profile.
//!
//! The profile is the single owner of ABI-affecting settings. It is built
//! once from `[toolchain]` and passed by shared reference into every compile
//! and link call, so every translation unit sees the same arch flags.

pub mod types;

pub use types::{CompilerPaths, Configuration, SourceKind, is_arch_flag};

use crate::config::FwConfig;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainProfile {
    pub compilers: CompilerPaths,
    pub objcopy: Option<String>,
    pub size_tool: Option<String>,
    pub nm_tool: Option<String>,
    pub arch_flags: Vec<String>,
    pub global_compile_flags: Vec<String>,
    pub global_link_flags: Vec<String>,
    pub linker_script: Option<PathBuf>,
    pub defines: BTreeSet<String>,
    configuration_flags: BTreeMap<Configuration, Vec<String>>,
}

/// Effective flag set for one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFlags {
    pub configuration: Configuration,
    pub arch_flags: Vec<String>,
    pub compile_flags: Vec<String>,
    pub configuration_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub defines: Vec<String>,
}

impl ResolvedFlags {
    /// Arch, global, configuration flags then `-D` defines, in that order.
    pub fn compile_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(
            self.arch_flags.len()
                + self.compile_flags.len()
                + self.configuration_flags.len()
                + self.defines.len(),
        );
        args.extend(self.arch_flags.iter().cloned());
        args.extend(self.compile_flags.iter().cloned());
        args.extend(self.configuration_flags.iter().cloned());
        args.extend(self.defines.iter().map(|d| format!("-D{}", d)));
        args
    }

    /// Arch flags are repeated at link time so the right multilib is picked.
    pub fn link_args(&self) -> Vec<String> {
        let mut args = self.arch_flags.clone();
        args.extend(self.link_flags.iter().cloned());
        args.extend(self.configuration_flags.iter().cloned());
        args
    }
}

impl ToolchainProfile {
    pub fn new() -> Self {
        Self {
            compilers: CompilerPaths::default(),
            objcopy: None,
            size_tool: None,
            nm_tool: None,
            arch_flags: Vec::new(),
            global_compile_flags: Vec::new(),
            global_link_flags: Vec::new(),
            linker_script: None,
            defines: BTreeSet::new(),
            configuration_flags: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &FwConfig) -> Result<Self> {
        let tc = &config.toolchain;
        let mut profile = Self::new();
        profile.compilers = CompilerPaths {
            c: non_empty(&tc.cc),
            cpp: non_empty(&tc.cxx),
            asm: non_empty(&tc.asm),
        };
        profile.objcopy = non_empty(&tc.objcopy);
        profile.size_tool = non_empty(&tc.size);
        profile.nm_tool = non_empty(&tc.nm).or_else(|| profile.size_tool.as_deref().map(derive_nm));
        profile.arch_flags = tc.arch_flags.clone();
        profile.global_compile_flags = tc.compile_flags.clone();
        profile.global_link_flags = tc.link_flags.clone();
        profile.linker_script = non_empty(&tc.linker_script).map(PathBuf::from);
        profile.defines = tc.defines.iter().cloned().collect();

        for (name, layer) in &config.configuration {
            let configuration: Configuration = name.parse().map_err(Error::config)?;
            if let Some(flags) = &layer.flags {
                profile.set_configuration_flags(configuration, flags.clone())?;
            }
        }
        Ok(profile)
    }

    /// Replace the optimization/debug layer of one configuration.
    pub fn set_configuration_flags(
        &mut self,
        configuration: Configuration,
        flags: Vec<String>,
    ) -> Result<()> {
        if let Some(bad) = flags.iter().find(|f| is_arch_flag(f)) {
            return Err(Error::config(format!(
                "configuration {} may not set arch flag '{}'; put it in [toolchain].arch_flags",
                configuration, bad
            )));
        }
        self.configuration_flags.insert(configuration, flags);
        Ok(())
    }

    pub fn configuration_flags(&self, configuration: Configuration) -> Vec<String> {
        self.configuration_flags
            .get(&configuration)
            .cloned()
            .unwrap_or_else(|| configuration.default_flags())
    }

    /// Check that every required tool is declared and that arch flags
    /// only live in the shared layer.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("cc", &self.compilers.c),
            ("cxx", &self.compilers.cpp),
            ("asm", &self.compilers.asm),
            ("objcopy", &self.objcopy),
            ("size", &self.size_tool),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.as_deref().is_none_or(|s| s.trim().is_empty()))
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "toolchain paths not set: {}",
                missing.join(", ")
            )));
        }
        if self.linker_script.is_none() {
            return Err(Error::config("toolchain linker_script not set"));
        }
        for (configuration, flags) in &self.configuration_flags {
            if let Some(bad) = flags.iter().find(|f| is_arch_flag(f)) {
                return Err(Error::config(format!(
                    "configuration {} may not set arch flag '{}'",
                    configuration, bad
                )));
            }
        }
        Ok(())
    }

    pub fn resolve(&self, configuration: Configuration) -> Result<ResolvedFlags> {
        self.validate()?;
        Ok(ResolvedFlags {
            configuration,
            arch_flags: self.arch_flags.clone(),
            compile_flags: self.global_compile_flags.clone(),
            configuration_flags: self.configuration_flags(configuration),
            link_flags: self.global_link_flags.clone(),
            defines: self.defines.iter().cloned().collect(),
        })
    }

    /// Driver used for a translation unit. Only valid after `validate`.
    pub fn compiler_for(&self, kind: SourceKind) -> Option<&str> {
        match kind {
            SourceKind::C => self.compilers.c.as_deref(),
            SourceKind::Cpp => self.compilers.cpp.as_deref(),
            SourceKind::Asm => self.compilers.asm.as_deref(),
        }
    }

    /// Stable digest of every setting that influences the produced objects.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |label: &str, value: &str| {
            hasher.update(label.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0xffu8]);
        };
        feed("cc", self.compilers.c.as_deref().unwrap_or(""));
        feed("cxx", self.compilers.cpp.as_deref().unwrap_or(""));
        feed("asm", self.compilers.asm.as_deref().unwrap_or(""));
        feed("objcopy", self.objcopy.as_deref().unwrap_or(""));
        feed("size", self.size_tool.as_deref().unwrap_or(""));
        feed("nm", self.nm_tool.as_deref().unwrap_or(""));
        for f in &self.arch_flags {
            feed("arch", f);
        }
        for f in &self.global_compile_flags {
            feed("cflag", f);
        }
        for f in &self.global_link_flags {
            feed("lflag", f);
        }
        if let Some(ld) = &self.linker_script {
            feed("ld", &ld.to_string_lossy());
        }
        for d in &self.defines {
            feed("define", d);
        }
        for c in Configuration::ALL {
            for f in self.configuration_flags(c) {
                feed(c.dir_name(), &f);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Default for ToolchainProfile {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `arm-none-eabi-size` -> `arm-none-eabi-nm`
fn derive_nm(size_tool: &str) -> String {
    match size_tool.strip_suffix("size") {
        Some(prefix) => format!("{}nm", prefix),
        None => match size_tool.strip_suffix("size.exe") {
            Some(prefix) => format!("{}nm.exe", prefix),
            None => "nm".to_string(),
        },
    }
}
