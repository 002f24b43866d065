use super::{Context, print_size_summary, print_warnings};
use crate::build::{self, Artifact, CleanScope, Orchestrator};
use crate::project::Project;
use anyhow::Result;
use colored::*;

/// Builds one target and prints its size summary. A failing analyzer is
/// reported but keeps the artifact usable.
pub fn build_target(ctx: &Context, project: &Project, target: &str) -> Result<Artifact> {
    let runner = ctx.runner();
    let mut orchestrator = Orchestrator::new(project, &runner).with_progress(!ctx.verbose);
    let outcome = orchestrator.build(target, ctx.configuration)?;

    print_warnings(&outcome.warnings);
    match (&outcome.artifact.analysis, &outcome.analysis_error) {
        (Some(analysis), _) => {
            print_size_summary(analysis);
            println!(
                "   {} {}",
                "Reports:".dimmed(),
                outcome.artifact.size_report_path().display()
            );
        }
        (None, Some(e)) => println!("{} Size analysis failed: {}", "!".yellow(), e),
        (None, None) => {}
    }
    println!(
        "{} {}",
        "✓".green(),
        outcome.artifact.path.display().to_string().bold()
    );
    Ok(outcome.artifact)
}

/// `fwf build`
pub fn build(ctx: &Context) -> Result<()> {
    let project = ctx.load()?;
    let target = ctx.target_name(&project)?;
    build_target(ctx, &project, &target)?;
    Ok(())
}

/// `fwf test`: builds the test firmware, optionally flashing it.
pub fn test(ctx: &Context, flash: bool) -> Result<()> {
    let project = ctx.load()?;
    let target = match &ctx.target {
        Some(t) => t.clone(),
        None => ["tests", "test"]
            .iter()
            .find(|n| project.registry.get(n).is_some())
            .map(|n| n.to_string())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no test target: declare a [[target]] named \"tests\" or pass --target"
                )
            })?,
    };
    let artifact = build_target(ctx, &project, &target)?;
    if flash {
        super::device::deploy_artifact(ctx, &project, &artifact.path, None, false)?;
    }
    Ok(())
}

/// `fwf clean`
pub fn clean(ctx: &Context, all: bool) -> Result<()> {
    let project = ctx.load()?;
    let scope = match (all, &ctx.target) {
        (true, _) => CleanScope::All,
        (false, Some(t)) => CleanScope::Target(t, ctx.configuration),
        (false, None) => CleanScope::Configuration(ctx.configuration),
    };
    build::clean(&project, scope)?;
    Ok(())
}
