use crate::error::{CompileFailure, Error, Result, Stage};
use crate::process::{Invocation, ProcessRunner};
use crate::registry::BuildTarget;
use crate::toolchain::{ResolvedFlags, SourceKind, ToolchainProfile};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::json;
use std::path::{Component, Path, PathBuf};

/// One translation unit and the object it produces.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub source: PathBuf,
    pub object: PathBuf,
    pub invocation: Invocation,
}

/// Object path for `source` below `obj_dir`. The whole relative source path
/// is kept, so `a/main.c` and `b/main.c` never share an object.
pub fn object_path(obj_dir: &Path, source: &Path) -> PathBuf {
    let mut rel = PathBuf::new();
    for c in source.components() {
        match c {
            Component::Normal(part) => rel.push(part),
            Component::ParentDir => rel.push("__"),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let mut name = rel.into_os_string();
    name.push(".o");
    obj_dir.join(name)
}

/// Builds the compiler command for every file of `target`.
pub fn plan(
    profile: &ToolchainProfile,
    flags: &ResolvedFlags,
    target: &BuildTarget,
    project_dir: &Path,
    obj_dir: &Path,
) -> Result<Vec<CompileUnit>> {
    let common = flags.compile_args();
    target
        .source_set
        .files()
        .iter()
        .map(|source| {
            let kind = SourceKind::from_path(source).ok_or_else(|| Error::Configuration {
                stage: Stage::Compile,
                detail: format!("don't know how to compile {}", source.display()),
            })?;
            let compiler = profile.compiler_for(kind).ok_or_else(|| {
                Error::config(format!("no compiler configured for {}", source.display()))
            })?;
            let object = object_path(obj_dir, source);
            let mut invocation = Invocation::new(compiler).args(common.iter().cloned());
            if kind == SourceKind::Asm {
                invocation = invocation.arg("-x").arg("assembler-with-cpp");
            }
            invocation = invocation.args(target.defines.iter().map(|d| format!("-D{}", d)));
            for dir in target.source_set.include_dirs() {
                invocation = invocation.arg(format!("-I{}", dir.display()));
            }
            let invocation = invocation
                .arg("-c")
                .path_arg(source)
                .arg("-o")
                .path_arg(&object)
                .current_dir(project_dir);
            Ok(CompileUnit {
                source: source.clone(),
                object,
                invocation,
            })
        })
        .collect()
}

/// `compile_commands.json` entries for `units`.
pub fn compile_commands(units: &[CompileUnit], project_dir: &Path) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = units
        .iter()
        .map(|u| {
            json!({
                "directory": project_dir.to_string_lossy(),
                "command": u.invocation.command_line(),
                "file": u.source.to_string_lossy(),
                "output": u.object.to_string_lossy(),
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}

/// Compiles every unit on a pool of `jobs` workers. All units run even when
/// some fail, so the caller sees every broken file at once. Objects come
/// back in unit order.
pub fn compile_all(
    runner: &dyn ProcessRunner,
    units: &[CompileUnit],
    jobs: usize,
    show_progress: bool,
) -> Result<Vec<PathBuf>> {
    for unit in units {
        if let Some(parent) = unit.object.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(Stage::Compile, parent, e))?;
        }
    }

    let pb = if show_progress {
        let pb = ProgressBar::new(units.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };
    pb.set_message("Compiling...");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| Error::Configuration {
            stage: Stage::Compile,
            detail: format!("cannot start {} compile workers: {}", jobs, e),
        })?;

    let results: Vec<std::result::Result<Option<CompileFailure>, Error>> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| -> std::result::Result<Option<CompileFailure>, Error> {
                pb.set_message(format!("Compiling {}", unit.source.display()));
                let out = runner.run(&unit.invocation).map_err(|source| Error::Tool {
                    stage: Stage::Compile,
                    program: unit.invocation.program.clone(),
                    source,
                })?;
                pb.inc(1);
                if !out.success() {
                    pb.println(format!(
                        "{} Error compiling {}:\n{}",
                        "x".red(),
                        unit.source.display(),
                        out.stderr
                    ));
                    return Ok(Some(CompileFailure {
                        source: unit.source.clone(),
                        exit_code: out.code,
                        stderr: out.stderr,
                    }));
                }
                if !out.stderr.trim().is_empty() {
                    pb.println(format!(
                        "{} Warning in {}:\n{}",
                        "!".yellow(),
                        unit.source.display(),
                        out.stderr
                    ));
                }
                Ok(None)
            })
            .collect()
    });

    let mut failures = Vec::new();
    for result in results {
        if let Some(failure) = result? {
            failures.push(failure);
        }
    }
    if failures.is_empty() {
        pb.finish_with_message("Compilation complete");
        Ok(units.iter().map(|u| u.object.clone()).collect())
    } else {
        pb.abandon_with_message("Compilation failed");
        Err(Error::Compile {
            failures,
            diagnostics: Vec::new(),
        })
    }
}
