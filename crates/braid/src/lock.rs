//! Pid-stamped lock files.
//!
//! Three files under `.braid/` use this shape: the single-writer store lock
//! taken by direct-mode CLI invocations, the daemon pid file, and the
//! exclusive sync lock an external tool drops to suppress daemon
//! reconciliation. A lock whose recorded process is no longer alive is
//! stale and may be removed by the next caller.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// A held lock file; removed on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, writing this process's pid into it.
    ///
    /// A stale lock (holder no longer alive) is removed and re-acquired; a
    /// live one fails with [`Error::Locked`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] when another live process holds the lock,
    /// or an IO error if the file cannot be created.
    pub fn acquire(path: &Path) -> Result<Self> {
        match try_create(path) {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match holder_pid(path) {
                    Some(pid) if process_alive(pid) => Err(Error::Locked {
                        pid,
                        path: path.display().to_string(),
                    }),
                    _ => {
                        debug!(path = %path.display(), "removing stale lock file");
                        fs::remove_file(path)?;
                        try_create(path)?;
                        Ok(Self {
                            path: path.to_path_buf(),
                        })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether `path` exists and its recorded holder is still alive.
///
/// Stale files are left in place; only [`LockFile::acquire`] removes them.
#[must_use]
pub fn is_held(path: &Path) -> bool {
    match holder_pid(path) {
        Some(pid) => process_alive(pid),
        None => path.exists(),
    }
}

/// The pid recorded in a lock file, if it parses.
#[must_use]
pub fn holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
}

/// Whether a process with the given pid is alive.
///
/// Probes `/proc`; on systems without procfs the holder is conservatively
/// assumed alive so a questionable lock is never clobbered.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    if Path::new("/proc").is_dir() {
        Path::new(&format!("/proc/{pid}")).exists()
    } else {
        true
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}
