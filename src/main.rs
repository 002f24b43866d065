//! # fwf CLI Entry Point
//!
//! Parses arguments with clap and routes to the handlers in
//! [`fwforge::commands`]. When a failing step ran an external tool, `fwf`
//! exits with that tool's exit code; any other failure exits with 1.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::PathBuf;

use fwforge::build::diagnostics;
use fwforge::commands::{self, Context};
use fwforge::error::Error;
use fwforge::toolchain::Configuration;

#[derive(Parser)]
#[command(name = "fwf")]
#[command(about = "Firmware build, size analysis, flashing and debugging", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory containing fw.toml
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,
    /// Override [project].build_dir
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,
    /// Use the Release configuration (shorthand for --config release)
    #[arg(long, global = true, conflicts_with = "config")]
    release: bool,
    /// Build configuration: release or debug
    #[arg(long, global = true)]
    config: Option<Configuration>,
    /// Target name from fw.toml
    #[arg(short, long, global = true)]
    target: Option<String>,
    /// Print every external command before it runs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, link and analyze a target
    Build,
    /// Build the test firmware
    Test {
        /// Flash it after a successful build
        #[arg(long)]
        flash: bool,
    },
    /// Build and write the firmware to the device
    Flash {
        /// Debug interface passed to the programmer (default from fw.toml)
        #[arg(long)]
        interface: Option<String>,
        /// Leave the core halted after programming
        #[arg(long)]
        no_reset: bool,
        /// Flash the existing artifact without rebuilding
        #[arg(long)]
        no_build: bool,
    },
    /// Build, start a GDB server and attach GDB
    Debug {
        /// Start only the server, for an IDE to attach to
        #[arg(long)]
        server_only: bool,
        /// Use the existing artifact without rebuilding
        #[arg(long)]
        no_build: bool,
    },
    /// Remove build outputs
    Clean {
        /// Remove every configuration
        #[arg(long)]
        all: bool,
    },
    /// Show resolved flags and targets
    Info,
    /// Generate shell completions
    Completion { shell: Shell },
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let configuration = match (cli.release, cli.config) {
        (true, _) => Configuration::Release,
        (false, Some(c)) => c,
        (false, None) => Configuration::Debug,
    };
    let ctx = Context {
        project_dir: cli.project.clone(),
        build_dir: cli.build_dir.clone(),
        configuration,
        target: cli.target.clone(),
        verbose: cli.verbose,
    };

    match &cli.command {
        Commands::Build => commands::build(&ctx),
        Commands::Test { flash } => commands::test(&ctx, *flash),
        Commands::Flash {
            interface,
            no_reset,
            no_build,
        } => commands::flash(&ctx, interface.as_deref(), *no_reset, *no_build),
        Commands::Debug {
            server_only,
            no_build,
        } => commands::debug(&ctx, *server_only, *no_build),
        Commands::Clean { all } => commands::clean(&ctx, *all),
        Commands::Info => commands::info(&ctx),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Prints `err` with any follow-up advice and returns the exit code.
fn report(err: &anyhow::Error) -> i32 {
    println!("{} {:#}", "x".red(), err);
    let Some(e) = err.downcast_ref::<Error>() else {
        return 1;
    };
    let tool_output = match e {
        Error::Compile { failures, .. } => failures
            .iter()
            .map(|f| f.stderr.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        Error::Link { stderr, .. } => stderr.clone(),
        _ => String::new(),
    };
    if let Some(hint) = diagnostics::hint(&tool_output) {
        println!("\n{} {}", "💡".yellow(), hint);
    }
    match e {
        Error::Deployment { .. } => println!(
            "\n{} Nothing was retried; the device may hold a partial image. Check the probe and run {} again.",
            "!".yellow(),
            "fwf flash".bold()
        ),
        Error::Busy { .. } | Error::ResourceBusy { .. } => println!(
            "\n{} Wait for the other session to finish, then try again.",
            "!".yellow()
        ),
        _ => {}
    }
    e.tool_exit_code().filter(|c| *c != 0).unwrap_or(1)
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        std::process::exit(report(&err));
    }
}
