use super::Context;
use super::build::build_target;
use crate::debug::{DebugBootstrap, ServerConfig};
use crate::deploy::DeploymentDriver;
use crate::project::Project;
use crate::registry::TargetRegistry;
use anyhow::{Context as _, Result};
use colored::*;
use std::path::{Path, PathBuf};

/// Builds the selected target, or with `no_build` picks up the artifact
/// already on disk.
fn artifact_for(ctx: &Context, project: &Project, no_build: bool) -> Result<PathBuf> {
    let name = ctx.target_name(project)?;
    if !no_build {
        return Ok(build_target(ctx, project, &name)?.path);
    }
    let target = project.registry.require(&name)?;
    let path = TargetRegistry::artifact_path(&project.build_dir, &target, ctx.configuration);
    if !path.is_file() {
        anyhow::bail!(
            "{} has not been built for {}; run `fwf build` first",
            name,
            ctx.configuration
        );
    }
    Ok(path)
}

pub fn deploy_artifact(
    ctx: &Context,
    project: &Project,
    artifact: &Path,
    interface: Option<&str>,
    no_reset: bool,
) -> Result<()> {
    let runner = ctx.runner();
    let driver = DeploymentDriver::new(&runner, project.probe(), project.flash.clone());
    let interface = interface.unwrap_or(project.flash.interface.as_str());
    let report = driver.deploy(artifact, interface, project.flash.reset_after && !no_reset)?;
    println!(
        "{} Flashed {} ({} step(s))",
        "✓".green(),
        artifact.display(),
        report.steps.len()
    );
    Ok(())
}

/// `fwf flash`
pub fn flash(ctx: &Context, interface: Option<&str>, no_reset: bool, no_build: bool) -> Result<()> {
    let project = ctx.load()?;
    let artifact = artifact_for(ctx, &project, no_build)?;
    deploy_artifact(ctx, &project, &artifact, interface, no_reset)
}

/// `fwf debug`: runs until the GDB client (or, with `server_only`, the
/// server) exits.
pub fn debug(ctx: &Context, server_only: bool, no_build: bool) -> Result<()> {
    let project = ctx.load()?;
    let artifact = artifact_for(ctx, &project, no_build)?;
    let mut server = ServerConfig::from_debug_config(&project.debug, &project.root)
        .context("Failed to prepare debug server")?;
    server.attach_client = !server_only;

    let runner = ctx.runner();
    let bootstrap = DebugBootstrap::new(&runner, project.probe());
    let mut session = bootstrap.start(&artifact, &server)?;
    if server_only {
        println!(
            "{} GDB server listening on port {}. Attach with `target extended-remote :{}`.",
            "✓".green(),
            server.port,
            server.port
        );
    }
    let code = session.wait()?;
    println!(
        "{} Debug session ended{}",
        "✓".green(),
        code.map(|c| format!(" (gdb exit code {})", c))
            .unwrap_or_default()
    );
    Ok(())
}
