//! CLI command handlers.
//!
//! Each handler loads the project, wires the real process runner into the
//! library types and prints progress the same way: `✓` for success, `!` for
//! warnings, `x` for failures.

pub mod build;
pub mod device;

pub use build::{build, clean, test};
pub use device::{debug, flash};

use crate::analyze::Analysis;
use crate::error::Warning;
use crate::process::SystemRunner;
use crate::project::Project;
use crate::toolchain::Configuration;
use crate::ui::{self, Table};
use anyhow::Result;
use colored::*;
use std::path::PathBuf;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub project_dir: PathBuf,
    pub build_dir: Option<PathBuf>,
    pub configuration: Configuration,
    pub target: Option<String>,
    pub verbose: bool,
}

impl Context {
    pub fn load(&self) -> Result<Project> {
        let mut project = Project::load(&self.project_dir)?;
        if let Some(dir) = &self.build_dir {
            project = project.with_build_dir(dir);
        }
        print_warnings(&project.warnings);
        Ok(project)
    }

    pub fn runner(&self) -> SystemRunner {
        SystemRunner::new(self.verbose)
    }

    /// `--target`, else the first declared target.
    pub fn target_name(&self, project: &Project) -> Result<String> {
        if let Some(name) = &self.target {
            return Ok(name.clone());
        }
        project
            .registry
            .default_target()
            .map(|t| t.name.clone())
            .ok_or_else(|| anyhow::anyhow!("fw.toml declares no [[target]]"))
    }
}

pub fn print_warnings(warnings: &[Warning]) {
    for w in warnings {
        println!("{} {}", "!".yellow(), w);
    }
}

/// Region fill table printed after every analyzed build.
pub fn print_size_summary(analysis: &Analysis) {
    let mut table =
        Table::new(&["Region", "Used", "Capacity", "Percent"]).right_align(&[1, 2, 3]);
    for r in &analysis.regions {
        let percent = format!("{:.2}%", r.percent);
        table.add_row(vec![
            r.name.clone(),
            ui::human_bytes(r.used),
            ui::human_bytes(r.capacity),
            if r.exceeded() {
                percent.red().bold().to_string()
            } else {
                percent
            },
        ]);
    }
    table.print();
    println!(
        "   flash {}  ram {}  sha256 {}",
        ui::human_bytes(analysis.size.total_flash_bytes).bold(),
        ui::human_bytes(analysis.size.total_ram_bytes).bold(),
        analysis.digest.get(..16).unwrap_or(analysis.digest.as_str()).dimmed()
    );
}

/// `fwf info`: resolved flags per configuration and the target list.
pub fn info(ctx: &Context) -> Result<()> {
    let project = ctx.load()?;
    println!("{} {}", "Project".bold(), project.name.cyan());
    println!("{}: {}", "Build dir".bold(), project.build_dir.display());
    println!("{}: {}", "Jobs".bold(), project.jobs);
    if let Some(script) = project.linker_script() {
        println!("{}: {}", "Linker script".bold(), script.display());
    }

    let mut flags = Table::new(&["Configuration", "Compile flags", "Link flags"]);
    for configuration in Configuration::ALL {
        match project.profile.resolve(configuration) {
            Ok(resolved) => flags.add_row(vec![
                configuration.to_string(),
                resolved.compile_args().join(" "),
                resolved.link_args().join(" "),
            ]),
            Err(e) => flags.add_row(vec![
                configuration.to_string(),
                e.to_string().red().to_string(),
                String::new(),
            ]),
        }
    }
    println!();
    flags.print();

    let mut targets =
        Table::new(&["Target", "Output", "Files", "Include dirs", "Libs"]).right_align(&[2]);
    for t in project.registry.iter() {
        targets.add_row(vec![
            t.name.clone(),
            t.output_name.clone(),
            t.source_set.files().len().to_string(),
            t.source_set
                .include_dirs()
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            t.extra_link_libs.join(" "),
        ]);
    }
    println!();
    targets.print();
    Ok(())
}
