use super::compile::{self, CompileUnit};
use super::diagnostics;
use super::link::{self, LinkOutputs};
use super::scripts::run_script;
use crate::analyze::{Analysis, Analyzer, SizeReport, SymbolReport, report};
use crate::error::{Error, Result, Stage, Warning};
use crate::process::ProcessRunner;
use crate::project::Project;
use crate::registry::{BuildTarget, TargetRegistry};
use crate::toolchain::Configuration;
use colored::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const STAMP: &str = "configure.stamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unconfigured,
    Configured,
    Built,
    Analyzed,
    Failed,
}

/// What `configure` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// No stamp existed; the directory was created and validated.
    Fresh,
    /// The stamp matched; nothing was redone.
    Unchanged,
    /// Profile or sources differ from the stamp; re-validated.
    Changed,
}

/// A linked image for one (target, configuration) pair.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub target: String,
    pub configuration: Configuration,
    pub path: PathBuf,
    pub outputs: LinkOutputs,
    /// `None` when the analyzer itself failed.
    pub analysis: Option<Analysis>,
}

impl Artifact {
    pub fn size_report(&self) -> Option<&SizeReport> {
        self.analysis.as_ref().map(|a| &a.size)
    }

    pub fn symbol_report(&self) -> Option<&SymbolReport> {
        self.analysis.as_ref().map(|a| &a.symbols)
    }

    pub fn size_report_path(&self) -> PathBuf {
        self.path.with_extension("size.txt")
    }

    pub fn symbol_report_path(&self) -> PathBuf {
        self.path.with_extension("symbols.txt")
    }
}

/// Result of a build that produced an artifact.
#[derive(Debug)]
pub struct BuildOutcome {
    pub artifact: Artifact,
    pub warnings: Vec<Warning>,
    /// Set when linking succeeded but analysis did not; the artifact is
    /// still stored and deployable.
    pub analysis_error: Option<Error>,
}

/// Drives configure -> compile/link -> post-build -> analyze for one
/// project. Workflow steps run one after another; only compilation fans
/// out across workers.
pub struct Orchestrator<'a> {
    project: &'a Project,
    runner: &'a dyn ProcessRunner,
    show_progress: bool,
    configured: BTreeSet<Configuration>,
    states: BTreeMap<(String, Configuration), BuildState>,
    artifacts: BTreeMap<(String, Configuration), Artifact>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(project: &'a Project, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            project,
            runner,
            show_progress: false,
            configured: BTreeSet::new(),
            states: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self, target: &str, configuration: Configuration) -> BuildState {
        if !self.configured.contains(&configuration) {
            return BuildState::Unconfigured;
        }
        self.states
            .get(&(target.to_string(), configuration))
            .copied()
            .unwrap_or(BuildState::Configured)
    }

    pub fn artifact(&self, target: &str, configuration: Configuration) -> Option<&Artifact> {
        self.artifacts.get(&(target.to_string(), configuration))
    }

    pub fn configuration_dir(&self, configuration: Configuration) -> PathBuf {
        self.project.build_dir.join(configuration.dir_name())
    }

    /// Digest of everything that makes a configuration's outputs stale.
    fn fingerprint(&self, configuration: Configuration) -> String {
        let mut hasher = Sha256::new();
        hasher.update(configuration.dir_name().as_bytes());
        hasher.update(self.project.profile.fingerprint().as_bytes());
        for target in self.project.registry.iter() {
            hasher.update(b"\0target\0");
            hasher.update(target.name.as_bytes());
            hasher.update(target.output_name.as_bytes());
            hasher.update(target.source_set.fingerprint().as_bytes());
            for lib in &target.extra_link_libs {
                hasher.update(b"\0l");
                hasher.update(lib.as_bytes());
            }
            for define in &target.defines {
                hasher.update(b"\0d");
                hasher.update(define.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Creates the configuration's output directory and validates the
    /// profile. Repeating it with unchanged inputs does nothing.
    pub fn configure(&mut self, configuration: Configuration) -> Result<ConfigureOutcome> {
        let dir = self.configuration_dir(configuration);
        let stamp_path = dir.join(STAMP);
        let fingerprint = self.fingerprint(configuration);

        let previous = fs::read_to_string(&stamp_path).ok();
        if previous.as_deref().map(str::trim) == Some(fingerprint.as_str())
            && self.configured.contains(&configuration)
        {
            return Ok(ConfigureOutcome::Unchanged);
        }

        self.project.profile.resolve(configuration)?;
        if let Some(script) = self.project.linker_script()
            && !script.is_file()
        {
            return Err(Error::config(format!(
                "linker script {} does not exist",
                script.display()
            )));
        }
        if self.project.registry.is_empty() {
            return Err(Error::config("no [[target]] declared"));
        }

        fs::create_dir_all(&dir).map_err(|e| Error::io(Stage::Configure, &dir, e))?;
        let outcome = match previous {
            None => ConfigureOutcome::Fresh,
            Some(p) if p.trim() == fingerprint => ConfigureOutcome::Unchanged,
            Some(_) => ConfigureOutcome::Changed,
        };
        if outcome != ConfigureOutcome::Unchanged {
            fs::write(&stamp_path, format!("{}\n", fingerprint))
                .map_err(|e| Error::io(Stage::Configure, &stamp_path, e))?;
            self.states.retain(|(_, c), _| *c != configuration);
            self.artifacts.retain(|(_, c), _| *c != configuration);
        }
        self.configured.insert(configuration);
        Ok(outcome)
    }

    /// Compiles, links and analyzes `target`. Configures first when needed.
    pub fn build(&mut self, target: &str, configuration: Configuration) -> Result<BuildOutcome> {
        if !self.configured.contains(&configuration) {
            self.configure(configuration)?;
        }
        let target = self.project.registry.require(target)?;
        let key = (target.name.clone(), configuration);
        self.artifacts.remove(&key);

        match self.compile_and_link(&target, configuration) {
            Ok(outputs) => {
                self.states.insert(key.clone(), BuildState::Built);
                let mut artifact = Artifact {
                    target: target.name.clone(),
                    configuration,
                    path: outputs.elf.clone(),
                    outputs,
                    analysis: None,
                };
                let (warnings, analysis_error) = match self.analyze(&artifact) {
                    Ok(analysis) => {
                        let warnings = analysis.warnings.clone();
                        artifact.analysis = Some(analysis);
                        self.states.insert(key.clone(), BuildState::Analyzed);
                        (warnings, None)
                    }
                    Err(e) => (Vec::new(), Some(e)),
                };
                self.artifacts.insert(key, artifact.clone());
                Ok(BuildOutcome {
                    artifact,
                    warnings,
                    analysis_error,
                })
            }
            Err(e) => {
                self.states.insert(key, BuildState::Failed);
                Err(e)
            }
        }
    }

    fn compile_and_link(
        &self,
        target: &BuildTarget,
        configuration: Configuration,
    ) -> Result<LinkOutputs> {
        let project = self.project;
        let start = Instant::now();
        let flags = project.profile.resolve(configuration)?;
        if target.source_set.is_empty() {
            return Err(Error::Configuration {
                stage: Stage::Resolve,
                detail: format!("target '{}' has no source files", target.name),
            });
        }

        let target_dir = TargetRegistry::target_dir(&project.build_dir, target, configuration);
        let obj_dir = target_dir.join("obj");
        let outputs = LinkOutputs::for_artifact(TargetRegistry::artifact_path(
            &project.build_dir,
            target,
            configuration,
        ));
        fs::create_dir_all(&obj_dir).map_err(|e| Error::io(Stage::Compile, &obj_dir, e))?;

        if let Some(pre) = &project.scripts.pre_build {
            run_script(
                self.runner,
                Stage::PreBuild,
                pre,
                &project.root,
                &outputs.elf,
                &target_dir,
            )?;
        }

        println!(
            "{} Building {} ({})",
            "🚀".blue(),
            target.name.bold(),
            configuration
        );
        let units = compile::plan(&project.profile, &flags, target, &project.root, &obj_dir)?;
        self.write_compile_commands(&units, &target_dir)?;

        let objects = match compile::compile_all(self.runner, &units, project.jobs, self.show_progress)
        {
            Ok(objects) => objects,
            Err(Error::Compile { failures, .. }) => {
                let diagnostics = diagnostics::collect(&failures, project.max_diagnostics);
                return Err(Error::Compile {
                    failures,
                    diagnostics,
                });
            }
            Err(e) => return Err(e),
        };

        // A failed link must not leave the previous image looking current.
        for stale in [&outputs.elf, &outputs.hex, &outputs.bin] {
            if let Err(e) = fs::remove_file(stale)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(Error::io(Stage::Link, stale, e));
            }
        }

        println!("   {} Linking {}...", "🔗".cyan(), outputs.elf.display());
        let inv = link::link_invocation(
            &project.profile,
            &flags,
            target,
            &objects,
            &outputs,
            &project.root,
        )?;
        link::link(self.runner, &inv)?;

        let objcopy = project
            .profile
            .objcopy
            .as_deref()
            .ok_or_else(|| Error::config("toolchain objcopy not set"))?;
        link::objcopy_images(self.runner, objcopy, &outputs, &project.root)?;

        if let Some(post) = &project.scripts.post_build {
            run_script(
                self.runner,
                Stage::PostBuild,
                post,
                &project.root,
                &outputs.elf,
                &target_dir,
            )?;
        }

        println!(
            "{} Build finished in {:.2?}",
            "✓".green(),
            start.elapsed()
        );
        Ok(outputs)
    }

    fn write_compile_commands(&self, units: &[CompileUnit], target_dir: &Path) -> Result<()> {
        let path = target_dir.join("compile_commands.json");
        let json = compile::compile_commands(units, &self.project.root);
        let text = serde_json::to_string_pretty(&json).map_err(|e| {
            Error::io(Stage::Compile, &path, std::io::Error::other(e))
        })?;
        fs::write(&path, text).map_err(|e| Error::io(Stage::Compile, &path, e))
    }

    /// Runs the analyzer and writes the plain-text reports beside the
    /// artifact.
    fn analyze(&self, artifact: &Artifact) -> Result<Analysis> {
        let profile = &self.project.profile;
        let script = self
            .project
            .linker_script()
            .ok_or_else(|| Error::config("toolchain linker_script not set"))?;
        let size_tool = profile
            .size_tool
            .as_deref()
            .ok_or_else(|| Error::config("toolchain size not set"))?;
        let nm_tool = profile.nm_tool.as_deref().unwrap_or("nm");

        let analysis = Analyzer::new(self.runner, size_tool, nm_tool, script).analyze(&artifact.path)?;

        let size_path = artifact.size_report_path();
        fs::write(&size_path, report::render_size_report(&artifact.path, &analysis))
            .map_err(|e| Error::io(Stage::Analyze, &size_path, e))?;
        let sym_path = artifact.symbol_report_path();
        fs::write(&sym_path, report::render_symbol_report(&artifact.path, &analysis))
            .map_err(|e| Error::io(Stage::Analyze, &sym_path, e))?;
        Ok(analysis)
    }
}
