//! Best-effort signal delivery to processes found by executable name.
//!
//! The scanner walks `/proc`, matching each pid's `comm` entry against the
//! configured process name. Note that `comm` is truncated to 15 characters
//! by the kernel, so longer names must be configured in truncated form.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use confmirror_core::Signal;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("no running process named {name:?}")]
    NotFound { name: String },

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sending signal {signal} to {name:?} (pid {pid}) failed: errno {errno}")]
    Send {
        name: String,
        pid: i32,
        signal: Signal,
        errno: i32,
    },

    #[error("signal delivery is not supported on this platform")]
    Unsupported,
}

/// Seam for the file-side watcher; tests substitute a recording fake.
pub trait ProcessSignaler: Send + Sync {
    fn signal(&self, name: &str, signal: Signal) -> Result<(), ProcessError>;
}

/// Signals the first live process whose `comm` matches the given name.
pub struct ProcScanner;

impl ProcScanner {
    fn find_pid(name: &str) -> Result<i32, ProcessError> {
        let proc_dir = Path::new("/proc");
        let entries = fs::read_dir(proc_dir).map_err(|source| ProcessError::Scan {
            path: "/proc".to_string(),
            source,
        })?;
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
                continue;
            };
            // Processes can exit mid-scan; unreadable entries are skipped.
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            if comm.trim_end() == name {
                return Ok(pid);
            }
        }
        Err(ProcessError::NotFound {
            name: name.to_string(),
        })
    }
}

impl ProcessSignaler for ProcScanner {
    fn signal(&self, name: &str, signal: Signal) -> Result<(), ProcessError> {
        let pid = Self::find_pid(name)?;
        send_signal(name, pid, signal)?;
        debug!(process = name, pid, %signal, "signal delivered");
        Ok(())
    }
}

#[cfg(unix)]
fn send_signal(name: &str, pid: i32, signal: Signal) -> Result<(), ProcessError> {
    let rc = unsafe { libc::kill(pid, signal.0) };
    if rc != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(ProcessError::Send {
            name: name.to_string(),
            pid,
            signal,
            errno,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_signal(_name: &str, _pid: i32, _signal: Signal) -> Result<(), ProcessError> {
    Err(ProcessError::Unsupported)
}
