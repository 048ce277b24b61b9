//! Unix process control using nix (fork/exec, waitpid, kill)

use std::os::unix::process::CommandExt;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use super::{LaunchCommand, ProbeState, TerminationMode};
use crate::error::{PlatformError, PlatformResult};

/// Shell convention for "terminated by signal N".
const SIGNAL_EXIT_BASE: i32 = 128;

/// Spawn into a fresh process group so terminal signals aimed at our group
/// do not reach the child.
pub fn spawn(launch: &LaunchCommand) -> PlatformResult<u32> {
    let mut cmd = launch.to_command();
    cmd.process_group(0);

    // The `Child` is dropped without waiting; `probe` reaps it later.
    let child = cmd.spawn().map_err(|e| launch.spawn_error(e))?;
    Ok(child.id())
}

/// Reap-and-check for our own children, signal-0 check for anything else.
pub fn probe(pid: u32) -> PlatformResult<ProbeState> {
    let nix_pid = to_pid(pid)?;

    match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => Ok(ProbeState::Alive),
        Ok(WaitStatus::Exited(_, code)) => Ok(ProbeState::Exited {
            exit_code: Some(code),
        }),
        Ok(WaitStatus::Signaled(_, signal, _)) => Ok(ProbeState::Exited {
            exit_code: Some(SIGNAL_EXIT_BASE + signal as i32),
        }),
        // stopped / continued / ptrace stops: the process still exists
        Ok(_) => Ok(ProbeState::Alive),
        // not our child (or already reaped): fall back to an existence check
        Err(Errno::ECHILD) => probe_by_signal(nix_pid),
        Err(e) => Err(PlatformError::Probe {
            pid,
            detail: e.to_string(),
        }),
    }
}

fn probe_by_signal(nix_pid: Pid) -> PlatformResult<ProbeState> {
    match kill(nix_pid, None) {
        Ok(()) => Ok(ProbeState::Alive),
        // exists but belongs to someone else
        Err(Errno::EPERM) => Ok(ProbeState::Alive),
        Err(Errno::ESRCH) => Ok(ProbeState::Exited { exit_code: None }),
        Err(e) => Err(PlatformError::Probe {
            pid: nix_pid.as_raw() as u32,
            detail: e.to_string(),
        }),
    }
}

pub fn request_termination(pid: u32, mode: TerminationMode) -> PlatformResult<()> {
    let nix_pid = to_pid(pid)?;
    let signal = match mode {
        TerminationMode::Graceful => Signal::SIGTERM,
        TerminationMode::Forced => Signal::SIGKILL,
    };

    kill(nix_pid, signal).map_err(|e| match e {
        Errno::ESRCH => PlatformError::NotFound { pid },
        other => PlatformError::Signal {
            pid,
            detail: format!("{signal}: {other}"),
        },
    })
}

/// Rejects ids that would address a process group (0 or negative after the
/// cast) instead of a single process.
fn to_pid(pid: u32) -> PlatformResult<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(PlatformError::NotFound { pid }),
    }
}
