use crate::error::{Error, Result, Stage};
use crate::process::{Invocation, ProcessRunner};
use colored::*;
use std::path::Path;

/// Runs a pre/post build hook from `project_dir`.
///
/// A `.rhai` file runs under the embedded engine with `ARTIFACT` and
/// `BUILD_DIR` in scope; anything else goes to the platform shell.
pub fn run_script(
    runner: &dyn ProcessRunner,
    stage: Stage,
    script: &str,
    project_dir: &Path,
    artifact: &Path,
    build_dir: &Path,
) -> Result<()> {
    if script.ends_with(".rhai") {
        let script_path = project_dir.join(script);
        if script_path.exists() {
            println!("   {} Running Rhai script: '{}'...", "📜".magenta(), script);
            let engine = rhai::Engine::new();
            let mut scope = rhai::Scope::new();
            scope.push_constant("ARTIFACT", artifact.to_string_lossy().to_string());
            scope.push_constant("BUILD_DIR", build_dir.to_string_lossy().to_string());
            let ast = engine.compile_file(script_path).map_err(|e| Error::Script {
                stage,
                script: script.to_string(),
                exit_code: 1,
                output: e.to_string(),
            })?;
            return engine
                .run_ast_with_scope(&mut scope, &ast)
                .map_err(|e| Error::Script {
                    stage,
                    script: script.to_string(),
                    exit_code: 1,
                    output: e.to_string(),
                });
        }
    }

    println!("   {} Running script: '{}'...", "📜".magenta(), script);
    let invocation = if cfg!(target_os = "windows") {
        Invocation::new("cmd").args(["/C", script])
    } else {
        Invocation::new("sh").args(["-c", script])
    }
    .current_dir(project_dir);

    let out = runner.run(&invocation).map_err(|source| Error::Tool {
        stage,
        program: invocation.program.clone(),
        source,
    })?;
    if !out.stdout.trim().is_empty() {
        print!("{}", out.stdout);
    }
    if !out.success() {
        return Err(Error::Script {
            stage,
            script: script.to_string(),
            exit_code: out.code,
            output: out.combined(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::SystemRunner;

    #[test]
    fn test_shell_script_failure_keeps_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_script(
            &SystemRunner::new(false),
            Stage::PostBuild,
            "echo nope >&2; exit 3",
            dir.path(),
            Path::new("fw.elf"),
            dir.path(),
        )
        .unwrap_err();
        match err {
            Error::Script {
                stage,
                exit_code,
                output,
                ..
            } => {
                assert_eq!(stage, Stage::PostBuild);
                assert_eq!(exit_code, 3);
                assert!(output.contains("nope"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rhai_script_sees_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("check.rhai"),
            "if !ARTIFACT.ends_with(\".elf\") { throw \"bad artifact\"; }",
        )
        .unwrap();
        let runner = SystemRunner::new(false);
        run_script(
            &runner,
            Stage::PostBuild,
            "check.rhai",
            dir.path(),
            Path::new("build/debug/fw/fw.elf"),
            dir.path(),
        )
        .unwrap();

        let err = run_script(
            &runner,
            Stage::PreBuild,
            "check.rhai",
            dir.path(),
            Path::new("fw.bin"),
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), Stage::PreBuild);
        assert!(err.to_string().contains("bad artifact"));
    }
}
