//! Flashing and debugging against scripted programmer and GDB processes:
//! failure without retry, cancellation, and exclusive probe access.

mod common;

use common::{FakeProcess, FakeToolchain, SIZE_RAM_OVERFLOW, fixture};
use fwforge::build::Orchestrator;
use fwforge::debug::{DebugBootstrap, ServerConfig};
use fwforge::deploy::{CancelToken, DeployStep, DeploymentDriver};
use fwforge::error::{Error, Stage};
use fwforge::probe::ProbeUser;
use fwforge::process::{Invocation, ProcessOutput, ProcessRunner, RunningProcess};
use fwforge::toolchain::Configuration;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, mpsc};
use std::thread;

fn built_artifact(fx: &common::Fixture) -> PathBuf {
    let runner = FakeToolchain::default();
    Orchestrator::new(&fx.project, &runner)
        .build("firmware", Configuration::Debug)
        .unwrap()
        .artifact
        .path
}

fn probe_is_free(fx: &common::Fixture) -> bool {
    fx.project.probe().try_acquire(ProbeUser::Deployment).is_ok()
}

#[test]
fn test_flash_programs_then_resets() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let runner = FakeToolchain::default();
    let driver = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone());

    let report = driver.deploy(&elf, "SWD", true).unwrap();
    let steps: Vec<DeployStep> = report.steps.iter().map(|(s, _)| *s).collect();
    assert_eq!(steps, vec![DeployStep::Program, DeployStep::Reset]);

    let calls = runner.calls_to("openocd");
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].args.last().unwrap(),
        &format!("program {{{}}} verify exit", elf.display())
    );
    assert!(probe_is_free(&fx));
}

#[test]
fn test_failed_flash_is_reported_once() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let before = fs::read(&elf).unwrap();
    let runner = FakeToolchain {
        programmer_exit: 1,
        ..FakeToolchain::default()
    };
    let driver = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone());

    let err = driver.deploy(&elf, "SWD", true).unwrap_err();
    match &err {
        Error::Deployment { exit_code, output } => {
            assert_eq!(*exit_code, 1);
            assert!(output.contains("open failed"));
        }
        other => panic!("expected a deployment error, got {other}"),
    }
    assert_eq!(err.stage(), Stage::Flash);
    assert_eq!(err.tool_exit_code(), Some(1));

    // No retry, no reset after a failed program step.
    assert_eq!(runner.calls_to("openocd").len(), 1);
    assert_eq!(fs::read(&elf).unwrap(), before);

    // The probe is free again for the next attempt.
    let retry = FakeToolchain::default();
    DeploymentDriver::new(&retry, fx.project.probe(), fx.project.flash.clone())
        .deploy(&elf, "SWD", false)
        .unwrap();
}

#[test]
fn test_oversized_image_is_still_deployable() {
    let fx = fixture();
    let runner = FakeToolchain {
        size_output: SIZE_RAM_OVERFLOW.to_string(),
        ..FakeToolchain::default()
    };
    let outcome = Orchestrator::new(&fx.project, &runner)
        .build("firmware", Configuration::Release)
        .unwrap();
    assert!(!outcome.warnings.is_empty());

    DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone())
        .deploy(&outcome.artifact.path, "SWD", true)
        .unwrap();
    assert_eq!(runner.calls_to("openocd").len(), 2);
}

#[test]
fn test_missing_artifact_never_touches_the_probe() {
    let fx = fixture();
    let runner = FakeToolchain::default();
    let driver = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone());
    let err = driver
        .deploy(&fx.project.build_dir.join("debug/firmware/blinky.elf"), "SWD", true)
        .unwrap_err();
    assert!(matches!(err, Error::Io { stage: Stage::Flash, .. }));
    assert!(runner.calls().is_empty());
}

/// Cancels the shared token after the first programmer step finishes.
struct CancelAfterFirstStep {
    inner: FakeToolchain,
    token: CancelToken,
}

impl ProcessRunner for CancelAfterFirstStep {
    fn run(&self, inv: &Invocation) -> io::Result<ProcessOutput> {
        let out = self.inner.run(inv)?;
        self.token.cancel();
        Ok(out)
    }

    fn spawn(&self, inv: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
        self.inner.spawn(inv)
    }
}

#[test]
fn test_cancel_stops_before_next_step() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let runner = CancelAfterFirstStep {
        inner: FakeToolchain::default(),
        token: CancelToken::new(),
    };
    let driver = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone());

    let err = driver
        .deploy_with_cancel(&elf, "SWD", true, &runner.token)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Cancelled {
            stage: Stage::Flash,
            completed: 1
        }
    ));
    assert_eq!(runner.inner.calls_to("openocd").len(), 1);
    assert!(probe_is_free(&fx));
}

#[test]
fn test_debug_session_holds_probe_until_stopped() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let runner = FakeToolchain::default();
    let server = ServerConfig::from_debug_config(&fx.project.debug, &fx.project.root).unwrap();

    let session = DebugBootstrap::new(&runner, fx.project.probe())
        .start(&elf, &server)
        .unwrap();
    assert!(session.is_active());

    let spawned = runner.calls();
    assert_eq!(spawned[0].program, "openocd");
    assert_eq!(
        spawned[0].args,
        vec![
            "-f",
            "interface/stlink.cfg",
            "-f",
            "target/stm32f401re.cfg",
            "-c",
            "gdb_port 3333"
        ]
    );
    assert_eq!(spawned[1].program, "arm-none-eabi-gdb");
    assert!(spawned[1].interactive);

    let flash = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone());
    let err = flash.deploy(&elf, "SWD", true).unwrap_err();
    assert!(matches!(err, Error::Busy { .. }), "{err}");

    session.stop().unwrap();
    flash.deploy(&elf, "SWD", true).unwrap();
}

/// Blocks inside the programmer until the test lets it finish.
struct GatedProgrammer {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ProcessRunner for GatedProgrammer {
    fn run(&self, _inv: &Invocation) -> io::Result<ProcessOutput> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(ProcessOutput::default())
    }

    fn spawn(&self, _inv: &Invocation) -> io::Result<Box<dyn RunningProcess>> {
        Ok(Box::new(FakeProcess::default()))
    }
}

#[test]
fn test_debug_refused_while_flashing() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let server = ServerConfig::from_debug_config(&fx.project.debug, &fx.project.root).unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let runner = GatedProgrammer {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };

    thread::scope(|s| {
        let flashing = s.spawn(|| {
            DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone())
                .deploy(&elf, "SWD", false)
        });
        entered_rx.recv().unwrap();

        let busy = DebugBootstrap::new(&runner, fx.project.probe())
            .start(&elf, &server)
            .err()
            .unwrap();
        assert!(matches!(busy, Error::ResourceBusy { .. }), "{busy}");
        assert_eq!(busy.stage(), Stage::Debug);

        release_tx.send(()).unwrap();
        flashing.join().unwrap().unwrap();
    });

    let session = DebugBootstrap::new(&runner, fx.project.probe())
        .start(&elf, &server)
        .unwrap();
    drop(session);
    assert!(probe_is_free(&fx));
}

#[test]
fn test_second_deploy_refused_while_flashing() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let runner = GatedProgrammer {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };

    thread::scope(|s| {
        let flashing = s.spawn(|| {
            DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone())
                .deploy(&elf, "SWD", false)
        });
        entered_rx.recv().unwrap();

        let busy = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone())
            .deploy(&elf, "SWD", false)
            .unwrap_err();
        assert!(matches!(busy, Error::Busy { .. }), "{busy}");
        assert_eq!(busy.stage(), Stage::Flash);

        release_tx.send(()).unwrap();
        flashing.join().unwrap().unwrap();
    });
    assert!(probe_is_free(&fx));
}

#[test]
fn test_second_debug_session_refused() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let runner = FakeToolchain::default();
    let server = ServerConfig::from_debug_config(&fx.project.debug, &fx.project.root).unwrap();

    let session = DebugBootstrap::new(&runner, fx.project.probe())
        .start(&elf, &server)
        .unwrap();
    let spawned = runner.calls().len();

    let busy = DebugBootstrap::new(&runner, fx.project.probe())
        .start(&elf, &server)
        .err()
        .unwrap();
    assert!(matches!(busy, Error::ResourceBusy { .. }), "{busy}");
    assert_eq!(runner.calls().len(), spawned);

    session.stop().unwrap();
    let again = DebugBootstrap::new(&runner, fx.project.probe())
        .start(&elf, &server)
        .unwrap();
    again.stop().unwrap();
}

#[test]
fn test_unknown_interface_never_touches_the_probe() {
    let fx = fixture();
    let elf = built_artifact(&fx);
    let runner = FakeToolchain::default();
    let err = DeploymentDriver::new(&runner, fx.project.probe(), fx.project.flash.clone())
        .deploy(&elf, "USB", true)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }), "{err}");
    assert!(runner.calls().is_empty());
    assert!(probe_is_free(&fx));
}
