//! Process liveness probe and graceful termination.
//!
//! Liveness uses signal 0, which performs the kernel's existence and
//! permission checks without delivering anything to the target.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Result of asking a process to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// SIGTERM was delivered.
    Signalled,
    /// The process no longer existed.
    AlreadyGone,
}

/// Seam between the status tracker and the operating system.
pub trait ProcessProbe: Send + Sync {
    /// True only if `pid` exists and may be signalled by this process.
    /// Permission failures count as "not alive".
    fn is_alive(&self, pid: u32) -> bool;

    /// Send SIGTERM to `pid`. A process that is already gone is not an error.
    fn terminate(&self, pid: u32) -> Result<TerminateOutcome, Errno>;
}

/// Probe backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> Result<TerminateOutcome, Errno> {
        terminate(pid)
    }
}

/// Non-destructive existence probe.
pub fn is_alive(pid: u32) -> bool {
    match to_pid(pid) {
        Some(pid) => signal::kill(pid, None).is_ok(),
        None => false,
    }
}

/// Send SIGTERM, tolerating ESRCH.
pub fn terminate(pid: u32) -> Result<TerminateOutcome, Errno> {
    let Some(target) = to_pid(pid) else {
        return Ok(TerminateOutcome::AlreadyGone);
    };
    match signal::kill(target, Signal::SIGTERM) {
        Ok(()) => Ok(TerminateOutcome::Signalled),
        Err(Errno::ESRCH) => Ok(TerminateOutcome::AlreadyGone),
        Err(e) => Err(e),
    }
}

/// Only strictly positive pids name a single process; 0 and negative
/// values would address process groups.
fn to_pid(pid: u32) -> Option<Pid> {
    let raw = i32::try_from(pid).ok()?;
    (raw > 0).then(|| Pid::from_raw(raw))
}
