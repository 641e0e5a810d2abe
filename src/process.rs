//! OS process interface: spawn, terminate, notify, and reap workers.
//!
//! The supervisor talks to the operating system only through the
//! [`ProcessOps`] trait, so its command handling can be exercised in
//! tests without forking or signaling real processes.

use crate::protocol::{self, Message, SendError};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Failure to start a worker process. Reported and non-fatal: the roster
/// is left unchanged and the supervisor keeps running.
#[derive(Debug)]
pub struct SpawnError {
    pub command: PathBuf,
    pub source: std::io::Error,
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to spawn worker {}: {}",
            self.command.display(),
            self.source
        )
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Everything the supervisor needs from the operating system.
pub trait ProcessOps {
    /// Start a new worker process, returning its identity.
    fn spawn(&mut self, command: &Path) -> Result<Pid, SpawnError>;

    /// Forceful termination (`SIGTERM`). Fire-and-forget.
    fn terminate(&mut self, pid: Pid) -> Result<(), Errno>;

    /// Queue a protocol message to a worker. Fire-and-forget.
    fn notify(&mut self, pid: Pid, message: Message) -> Result<(), SendError>;

    /// Drain every terminated child without blocking.
    fn reap_any(&mut self) -> Vec<Pid>;

    /// Block until `pid` has confirmed termination. A pid that was
    /// already reaped by the asynchronous drain is fine.
    fn await_exit(&mut self, pid: Pid);
}

/// The real thing.
pub struct SystemProcesses;

impl ProcessOps for SystemProcesses {
    fn spawn(&mut self, command: &Path) -> Result<Pid, SpawnError> {
        // Stdio is inherited so worker report blocks land on the
        // operator's terminal.
        let child = Command::new(command).spawn().map_err(|e| SpawnError {
            command: command.to_path_buf(),
            source: e,
        })?;
        let pid = Pid::from_raw(child.id() as i32);
        tracing::info!(%pid, command = %command.display(), "worker spawned");
        // The Child handle is dropped; exits are collected with waitpid
        // from the SIGCHLD-driven drain, not through the handle.
        Ok(pid)
    }

    fn terminate(&mut self, pid: Pid) -> Result<(), Errno> {
        kill(pid, Signal::SIGTERM)
    }

    fn notify(&mut self, pid: Pid, message: Message) -> Result<(), SendError> {
        protocol::send(pid, message)
    }

    fn reap_any(&mut self) -> Vec<Pid> {
        let mut exited = Vec::new();
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, status)) => {
                    tracing::debug!(%pid, status, "worker exited");
                    exited.push(pid);
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    tracing::debug!(%pid, %signal, "worker killed by signal");
                    exited.push(pid);
                }
                // No further state changes, or no children at all.
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "waitpid failed while draining exits");
                    break;
                }
            }
        }
        exited
    }

    fn await_exit(&mut self, pid: Pid) {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return,
                // Already collected by the non-blocking drain.
                Err(Errno::ECHILD) => return,
                Err(Errno::EINTR) => continue,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(%pid, error = %e, "waitpid failed awaiting exit");
                    return;
                }
            }
        }
    }
}
