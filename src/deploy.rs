//! Writing an artifact to the device.
//!
//! A deployment is a short list of programmer invocations (program and
//! verify, then optionally reset) run while holding the probe. A failing
//! step ends the deployment with its exit code; nothing is retried, since
//! the flash contents after a partial write are unknown. Re-running `flash`
//! is the retry.

use crate::config::{FlashConfig, ProgrammerKind};
use crate::error::{Error, Result, Stage};
use crate::probe::{AcquireError, Probe, ProbeUser};
use crate::process::{Invocation, ProcessOutput, ProcessRunner};
use colored::*;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation, checked only between programmer invocations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    Program,
    Reset,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStep::Program => f.write_str("program"),
            DeployStep::Reset => f.write_str("reset"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub steps: Vec<(DeployStep, ProcessOutput)>,
}

fn program_name(config: &FlashConfig) -> &str {
    match (&config.path, config.programmer) {
        (Some(path), _) => path,
        (None, ProgrammerKind::Openocd) => "openocd",
        (None, ProgrammerKind::Stm32Programmer) => "STM32_Programmer_CLI",
    }
}

/// Transports `openocd` accepts after `transport select`.
const OPENOCD_TRANSPORTS: &[&str] = &[
    "swd",
    "jtag",
    "hla_swd",
    "hla_jtag",
    "dapdirect_swd",
    "dapdirect_jtag",
    "swim",
];

/// `interface` as an openocd transport name.
fn openocd_transport(interface: &str) -> Result<String> {
    let transport = interface.trim().to_ascii_lowercase();
    if OPENOCD_TRANSPORTS.contains(&transport.as_str()) {
        Ok(transport)
    } else {
        Err(Error::config(format!(
            "openocd has no transport '{}' (expected one of: {})",
            interface,
            OPENOCD_TRANSPORTS.join(", ")
        )))
    }
}

/// Programmer invocations for one deployment, in execution order.
pub fn plan(
    config: &FlashConfig,
    artifact: &Path,
    interface: &str,
    reset_after: bool,
) -> Result<Vec<(DeployStep, Invocation)>> {
    let program = program_name(config);
    let image = artifact.to_string_lossy();
    let mut steps = Vec::new();
    match config.programmer {
        ProgrammerKind::Openocd => {
            // Selected after the adapter scripts, which register the transports.
            let transport = format!("transport select {}", openocd_transport(interface)?);
            let base = || {
                config
                    .config_files
                    .iter()
                    .fold(Invocation::new(program), |inv, f| inv.arg("-f").arg(f))
                    .args(config.args.iter().cloned())
                    .arg("-c")
                    .arg(transport.as_str())
            };
            steps.push((
                DeployStep::Program,
                base().arg("-c").arg(format!("program {{{}}} verify exit", image)),
            ));
            if reset_after {
                steps.push((
                    DeployStep::Reset,
                    base().arg("-c").arg("init; reset run; shutdown"),
                ));
            }
        }
        ProgrammerKind::Stm32Programmer => {
            let port = format!("port={}", interface);
            steps.push((
                DeployStep::Program,
                Invocation::new(program)
                    .args(["-c", port.as_str()])
                    .args(config.args.iter().cloned())
                    .arg("-w")
                    .path_arg(artifact)
                    .arg("-v"),
            ));
            if reset_after {
                steps.push((
                    DeployStep::Reset,
                    Invocation::new(program).args(["-c", port.as_str(), "-rst"]),
                ));
            }
        }
    }
    Ok(steps)
}

pub struct DeploymentDriver<'a> {
    runner: &'a dyn ProcessRunner,
    probe: Probe,
    config: FlashConfig,
}

impl<'a> DeploymentDriver<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, probe: Probe, config: FlashConfig) -> Self {
        Self {
            runner,
            probe,
            config,
        }
    }

    pub fn deploy(&self, artifact: &Path, interface: &str, reset_after: bool) -> Result<DeployReport> {
        self.deploy_with_cancel(artifact, interface, reset_after, &CancelToken::new())
    }

    /// Like [`deploy`](Self::deploy), but stops before the next step once
    /// `cancel` fires. An invocation already running is always waited for.
    pub fn deploy_with_cancel(
        &self,
        artifact: &Path,
        interface: &str,
        reset_after: bool,
        cancel: &CancelToken,
    ) -> Result<DeployReport> {
        if !artifact.is_file() {
            return Err(Error::io(
                Stage::Flash,
                artifact,
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact not built"),
            ));
        }
        let steps = plan(&self.config, artifact, interface, reset_after)?;
        let _guard = self
            .probe
            .try_acquire(ProbeUser::Deployment)
            .map_err(|e| match e {
                AcquireError::Busy { holder } => Error::Busy { holder },
                AcquireError::Io { path, source } => Error::io(Stage::Flash, path, source),
            })?;

        let mut report = DeployReport { steps: Vec::new() };
        for (step, invocation) in steps {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    stage: Stage::Flash,
                    completed: report.steps.len(),
                });
            }
            println!("   {} {} {}", "⚡".yellow(), step, artifact.display());
            let out = self.runner.run(&invocation).map_err(|source| Error::Tool {
                stage: Stage::Flash,
                program: invocation.program.clone(),
                source,
            })?;
            if !out.success() {
                return Err(Error::Deployment {
                    exit_code: out.code,
                    output: out.combined(),
                });
            }
            report.steps.push((step, out));
        }
        Ok(report)
    }
}
