//! Debug session bootstrap: a GDB server bound to the probe plus a GDB
//! client attached to it.

use crate::config::{DebugConfig, ServerKind};
use crate::error::{Error, Result, Stage};
use crate::probe::{AcquireError, Probe, ProbeGuard, ProbeUser};
use crate::process::{Invocation, ProcessRunner, RunningProcess};
use colored::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LAUNCH_CONFIG: &str = ".vscode/launch.json";
pub const DEFAULT_GDB: &str = "arm-none-eabi-gdb";

/// Everything needed to start a server/client pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub kind: ServerKind,
    pub server_path: Option<String>,
    pub gdb: String,
    pub port: u16,
    /// Probe adapter, e.g. `stlink`.
    pub adapter: Option<String>,
    /// Target chip, e.g. `STM32F407VG`.
    pub chip: Option<String>,
    /// openocd `-f` scripts.
    pub config_files: Vec<String>,
    /// Start the client too; `false` leaves the server for an IDE to attach.
    pub attach_client: bool,
}

/// Fields read from the first configuration of a launch file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOverrides {
    pub servertype: Option<String>,
    pub device: Option<String>,
    pub config_files: Vec<String>,
}

/// Parses an editor launch file. Whole-line `//` comments are allowed, as
/// editors write them.
pub fn parse_launch_config(text: &str) -> serde_json::Result<LaunchOverrides> {
    let stripped: String = text
        .lines()
        .filter(|l| !l.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");
    let value: Value = serde_json::from_str(&stripped)?;
    let Some(first) = value
        .get("configurations")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return Ok(LaunchOverrides::default());
    };
    let text_field = |key: &str| {
        first
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Ok(LaunchOverrides {
        servertype: text_field("servertype"),
        device: text_field("device"),
        config_files: first
            .get("configFiles")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Maps a launch file `servertype` (the GDB server, not the adapter).
fn server_kind(servertype: &str) -> Option<ServerKind> {
    match servertype.to_ascii_lowercase().as_str() {
        "openocd" => Some(ServerKind::Openocd),
        "stlink" => Some(ServerKind::StlinkGdbserver),
        _ => None,
    }
}

impl ServerConfig {
    /// `[debug]` settings, overridden by the launch file when it exists.
    /// The launch file is read on every call.
    pub fn from_debug_config(config: &DebugConfig, project_dir: &Path) -> Result<Self> {
        let mut server = Self {
            kind: config.server,
            server_path: config.server_path.clone(),
            gdb: config.gdb.clone().unwrap_or_else(|| DEFAULT_GDB.to_string()),
            port: config.port,
            adapter: config.adapter.clone(),
            chip: config.chip.clone(),
            config_files: Vec::new(),
            attach_client: true,
        };

        let launch = project_dir.join(
            config
                .launch_config
                .as_deref()
                .unwrap_or(DEFAULT_LAUNCH_CONFIG),
        );
        if launch.is_file() {
            let text =
                fs::read_to_string(&launch).map_err(|e| Error::io(Stage::Debug, &launch, e))?;
            let overrides = parse_launch_config(&text).map_err(|e| Error::Debug {
                detail: format!("{} is not valid JSON: {}", launch.display(), e),
            })?;
            if let Some(servertype) = &overrides.servertype {
                server.kind = server_kind(servertype).ok_or_else(|| Error::Debug {
                    detail: format!(
                        "{}: servertype '{}' is not supported (expected openocd or stlink)",
                        launch.display(),
                        servertype
                    ),
                })?;
            }
            if overrides.device.is_some() {
                server.chip = overrides.device;
            }
            if !overrides.config_files.is_empty() {
                server.config_files = overrides.config_files;
            }
        }
        Ok(server)
    }

    pub fn server_invocation(&self) -> Result<Invocation> {
        match self.kind {
            ServerKind::Openocd => {
                let mut inv = Invocation::new(self.server_path.as_deref().unwrap_or("openocd"));
                if self.config_files.is_empty() {
                    let (Some(adapter), Some(chip)) = (&self.adapter, &self.chip) else {
                        return Err(Error::Debug {
                            detail: "openocd needs config_files, or both adapter and chip"
                                .to_string(),
                        });
                    };
                    inv = inv
                        .arg("-f")
                        .arg(format!("interface/{}.cfg", adapter))
                        .arg("-f")
                        .arg(format!("target/{}.cfg", chip.to_ascii_lowercase()));
                } else {
                    for f in &self.config_files {
                        inv = inv.arg("-f").arg(f);
                    }
                }
                Ok(inv.arg("-c").arg(format!("gdb_port {}", self.port)))
            }
            ServerKind::StlinkGdbserver => Ok(Invocation::new(
                self.server_path.as_deref().unwrap_or("ST-LINK_gdbserver"),
            )
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-d")),
        }
    }

    pub fn client_invocation(&self, artifact: &Path) -> Invocation {
        Invocation::new(&self.gdb)
            .path_arg(artifact)
            .arg("-ex")
            .arg(format!("target extended-remote localhost:{}", self.port))
            .interactive()
    }
}

pub struct DebugBootstrap<'a> {
    runner: &'a dyn ProcessRunner,
    probe: Probe,
}

impl<'a> DebugBootstrap<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, probe: Probe) -> Self {
        Self { runner, probe }
    }

    /// Starts the server, then the client. A held probe fails straight away
    /// with [`Error::ResourceBusy`]. Whatever was started is torn down if a
    /// later step fails.
    pub fn start(&self, artifact: &Path, server: &ServerConfig) -> Result<DebugSession> {
        if !artifact.is_file() {
            return Err(Error::io(
                Stage::Debug,
                artifact,
                std::io::Error::new(std::io::ErrorKind::NotFound, "artifact not built"),
            ));
        }
        let server_inv = server.server_invocation()?;
        let guard = self
            .probe
            .try_acquire(ProbeUser::Debug)
            .map_err(|e| match e {
                AcquireError::Busy { holder } => Error::ResourceBusy { holder },
                AcquireError::Io { path, source } => Error::io(Stage::Debug, path, source),
            })?;

        println!(
            "   {} Starting {} on port {}",
            "🐞".cyan(),
            server_inv.program,
            server.port
        );
        let mut server_proc = self.runner.spawn(&server_inv).map_err(|source| Error::Tool {
            stage: Stage::Debug,
            program: server_inv.program.clone(),
            source,
        })?;
        if let Ok(Some(code)) = server_proc.try_wait() {
            return Err(Error::Debug {
                detail: format!("{} exited immediately with code {}", server_inv.program, code),
            });
        }

        let client = if server.attach_client {
            let client_inv = server.client_invocation(artifact);
            match self.runner.spawn(&client_inv) {
                Ok(client) => Some(client),
                Err(source) => {
                    let _ = server_proc.terminate();
                    return Err(Error::Tool {
                        stage: Stage::Debug,
                        program: client_inv.program.clone(),
                        source,
                    });
                }
            }
        } else {
            None
        };

        Ok(DebugSession {
            artifact: artifact.to_path_buf(),
            port: server.port,
            server: Some(server_proc),
            client,
            guard: Some(guard),
        })
    }
}

/// A running server/client pair holding the probe. Dropping the session
/// stops both processes.
pub struct DebugSession {
    pub artifact: PathBuf,
    pub port: u16,
    server: Option<Box<dyn RunningProcess>>,
    client: Option<Box<dyn RunningProcess>>,
    guard: Option<ProbeGuard>,
}

impl DebugSession {
    pub fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Blocks until the client exits, then stops the server. Returns the
    /// client's exit code; `None` when no client was attached, in which case
    /// it waits for the server instead.
    pub fn wait(&mut self) -> Result<Option<i32>> {
        let code = if let Some(client) = self.client.as_mut() {
            let code = client.wait().map_err(|e| Error::Debug {
                detail: format!("waiting for gdb: {}", e),
            })?;
            self.client = None;
            Some(code)
        } else if let Some(server) = self.server.as_mut() {
            server.wait().map_err(|e| Error::Debug {
                detail: format!("waiting for gdb server: {}", e),
            })?;
            self.server = None;
            None
        } else {
            None
        };
        self.shutdown()?;
        Ok(code)
    }

    /// Terminates client and server and releases the probe.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;
        for mut proc in [self.client.take(), self.server.take()].into_iter().flatten() {
            if matches!(proc.try_wait(), Ok(Some(_))) {
                continue;
            }
            if let Err(e) = proc.terminate() {
                first_error.get_or_insert(Error::Debug {
                    detail: format!("failed to stop debug process: {}", e),
                });
            }
        }
        self.guard = None;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
