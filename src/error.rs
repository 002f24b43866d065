//! Error and warning taxonomy.
//!
//! Every error names the [`Stage`] it came from and keeps the underlying
//! tool's output untouched. Warnings never abort an invocation; they travel
//! next to successful results.

use std::fmt;
use std::path::PathBuf;

/// The workflow step an error or warning originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configure,
    Resolve,
    PreBuild,
    Compile,
    Link,
    PostBuild,
    Analyze,
    Flash,
    Debug,
    Clean,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Resolve => "resolve",
            Stage::PreBuild => "pre-build",
            Stage::Compile => "compile",
            Stage::Link => "link",
            Stage::PostBuild => "post-build",
            Stage::Analyze => "analyze",
            Stage::Flash => "flash",
            Stage::Debug => "debug",
            Stage::Clean => "clean",
        };
        f.write_str(name)
    }
}

/// One translation unit that failed to compile.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub source: PathBuf,
    pub exit_code: i32,
    /// Compiler stderr exactly as emitted.
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("[{stage}] configuration error: {detail}")]
    Configuration { stage: Stage, detail: String },

    #[error("[compile] {} translation unit(s) failed:\n{}", failures.len(), diagnostics.join("\n"))]
    Compile {
        failures: Vec<CompileFailure>,
        /// Distinct diagnostics across all failures, bounded.
        diagnostics: Vec<String>,
    },

    #[error("[link] linker exited with code {exit_code}:\n{stderr}")]
    Link { exit_code: i32, stderr: String },

    #[error("[post-build] {step} failed (exit code {exit_code}):\n{output}")]
    PostBuild {
        step: String,
        exit_code: i32,
        output: String,
    },

    #[error("[{stage}] script '{script}' failed (exit code {exit_code}):\n{output}")]
    Script {
        stage: Stage,
        script: String,
        exit_code: i32,
        output: String,
    },

    #[error("[analyze] {detail}")]
    Analysis { detail: String },

    #[error("[flash] programmer exited with code {exit_code}:\n{output}")]
    Deployment { exit_code: i32, output: String },

    #[error("[flash] probe is busy (held by {holder})")]
    Busy { holder: String },

    #[error("[debug] probe is busy (held by {holder})")]
    ResourceBusy { holder: String },

    #[error("[debug] {detail}")]
    Debug { detail: String },

    #[error("[{stage}] cancelled after {completed} completed step(s)")]
    Cancelled { stage: Stage, completed: usize },

    #[error("[{stage}] failed to run '{program}': {source}")]
    Tool {
        stage: Stage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{stage}] I/O error on {}: {source}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(detail: impl Into<String>) -> Self {
        Error::Configuration {
            stage: Stage::Configure,
            detail: detail.into(),
        }
    }

    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Error::Configuration { stage, .. } => *stage,
            Error::Compile { .. } => Stage::Compile,
            Error::Link { .. } => Stage::Link,
            Error::PostBuild { .. } => Stage::PostBuild,
            Error::Script { stage, .. } => *stage,
            Error::Analysis { .. } => Stage::Analyze,
            Error::Deployment { .. } | Error::Busy { .. } => Stage::Flash,
            Error::ResourceBusy { .. } | Error::Debug { .. } => Stage::Debug,
            Error::Cancelled { stage, .. } => *stage,
            Error::Tool { stage, .. } => *stage,
            Error::Io { stage, .. } => *stage,
        }
    }

    /// Exit code of the external tool behind this error, if one ran.
    pub fn tool_exit_code(&self) -> Option<i32> {
        match self {
            Error::Compile { failures, .. } => failures.first().map(|f| f.exit_code),
            Error::Link { exit_code, .. }
            | Error::PostBuild { exit_code, .. }
            | Error::Script { exit_code, .. }
            | Error::Deployment { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal findings.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A declared source root matched no files.
    SourceResolution { target: String, pattern: String },
    /// A memory region is filled past its declared capacity.
    SizeExceeded {
        region: String,
        used: u64,
        capacity: u64,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SourceResolution { target, pattern } => {
                write!(f, "[resolve] '{}' matched no files (target '{}')", pattern, target)
            }
            Warning::SizeExceeded {
                region,
                used,
                capacity,
            } => write!(
                f,
                "[analyze] region {} overflows: {} of {} bytes used",
                region, used, capacity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reports_stage_and_tool_output() {
        let err = Error::Link {
            exit_code: 1,
            stderr: "region `FLASH' overflowed by 24 bytes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("[link]"));
        assert!(msg.contains("region `FLASH' overflowed by 24 bytes"));
        assert_eq!(err.stage(), Stage::Link);
        assert_eq!(err.tool_exit_code(), Some(1));
    }

    #[test]
    fn test_busy_errors_have_no_exit_code() {
        let err = Error::Busy {
            holder: "debug".into(),
        };
        assert_eq!(err.stage(), Stage::Flash);
        assert_eq!(err.tool_exit_code(), None);
    }

    #[test]
    fn test_compile_error_uses_first_failure_code() {
        let err = Error::Compile {
            failures: vec![CompileFailure {
                source: PathBuf::from("Core/Src/main.c"),
                exit_code: 4,
                stderr: String::new(),
            }],
            diagnostics: vec!["main.c:1:1: error: boom".into()],
        };
        assert_eq!(err.tool_exit_code(), Some(4));
        assert!(err.to_string().contains("main.c:1:1: error: boom"));
    }
}
