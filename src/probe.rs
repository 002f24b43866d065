//! Exclusive access to the debug probe.
//!
//! Flashing and debugging share one physical port. Both go through
//! [`Probe::try_acquire`], which never waits: a held probe is reported as
//! busy straight away. The guard releases on drop, on every exit path.
//!
//! Exclusion is enforced inside the process by a shared handle and across
//! handles and processes by an OS advisory lock on `probe.lock`. The lock
//! dies with its owner, so a crashed `fwf` never leaves the probe held. The
//! file itself is never deleted; it only records who holds it.

use std::fmt;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeUser {
    Deployment,
    Debug,
}

impl fmt::Display for ProbeUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeUser::Deployment => f.write_str("deployment"),
            ProbeUser::Debug => f.write_str("debug session"),
        }
    }
}

#[derive(Debug)]
pub enum AcquireError {
    Busy { holder: String },
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Default)]
struct Inner {
    holder: Mutex<Option<ProbeUser>>,
    lock_file: Option<PathBuf>,
}

/// Cheap to clone; every clone guards the same probe.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    inner: Arc<Inner>,
}

impl Probe {
    /// In-process exclusion only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also exclude other handles and processes through `path`.
    pub fn with_lock_file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                holder: Mutex::new(None),
                lock_file: Some(path.into()),
            }),
        }
    }

    pub fn holder(&self) -> Option<ProbeUser> {
        *self.state()
    }

    fn state(&self) -> MutexGuard<'_, Option<ProbeUser>> {
        self.inner
            .holder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn try_acquire(&self, user: ProbeUser) -> Result<ProbeGuard, AcquireError> {
        let mut state = self.state();
        if let Some(holder) = *state {
            return Err(AcquireError::Busy {
                holder: holder.to_string(),
            });
        }
        let file = match &self.inner.lock_file {
            Some(path) => Some(lock_file(path, user)?),
            None => None,
        };
        *state = Some(user);
        Ok(ProbeGuard {
            probe: self.clone(),
            user,
            file,
        })
    }

    fn release(&self) {
        *self.state() = None;
    }
}

/// Proof of exclusive probe ownership.
#[derive(Debug)]
pub struct ProbeGuard {
    probe: Probe,
    user: ProbeUser,
    /// Holds the advisory lock; closing it unlocks.
    file: Option<File>,
}

impl ProbeGuard {
    pub fn user(&self) -> ProbeUser {
        self.user
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.set_len(0);
            let _ = file.unlock();
        }
        self.probe.release();
    }
}

/// Takes the advisory lock on `path` without waiting, then records the
/// owner in it.
fn lock_file(path: &Path, user: ProbeUser) -> Result<File, AcquireError> {
    let io_err = |source| AcquireError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io_err)?;

    match file.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            let mut content = String::new();
            let _ = file.read_to_string(&mut content);
            let (pid, who) = parse_lock(&content);
            return Err(AcquireError::Busy {
                holder: match pid {
                    Some(pid) => format!("{} (pid {})", who, pid),
                    None => format!("{} ({})", who, path.display()),
                },
            });
        }
        Err(TryLockError::Error(e)) => return Err(io_err(e)),
    }

    file.set_len(0).map_err(io_err)?;
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    writeln!(file, "{} {}", std::process::id(), user).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(file)
}

fn parse_lock(content: &str) -> (Option<u32>, String) {
    let mut parts = content.trim().splitn(2, ' ');
    let pid = parts.next().and_then(|p| p.parse().ok());
    let who = parts
        .next()
        .filter(|w| !w.is_empty())
        .unwrap_or("another process")
        .to_string();
    (pid, who)
}
