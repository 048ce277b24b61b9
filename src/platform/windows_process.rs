//! Windows process control using the Win32 process API

use std::os::windows::process::CommandExt;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Threading::{
    CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW, GetExitCodeProcess, OpenProcess,
    PROCESS_ACCESS_RIGHTS, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_TERMINATE,
    TerminateProcess,
};

use super::{LaunchCommand, ProbeState, TerminationMode};
use crate::error::{PlatformError, PlatformResult};

/// `GetExitCodeProcess` reports this while the process is running.
const STILL_ACTIVE: u32 = 259;

/// Exit code handed to `TerminateProcess`.
const TERMINATED_EXIT_CODE: u32 = 1;

/// RAII wrapper for a process HANDLE
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> PlatformResult<Self> {
        let handle = unsafe { OpenProcess(access, false, pid) }
            .map_err(|_| PlatformError::NotFound { pid })?;
        Ok(ProcessHandle(handle))
    }

    fn handle(&self) -> HANDLE {
        self.0
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Spawn in a new process group without a console window.
pub fn spawn(launch: &LaunchCommand) -> PlatformResult<u32> {
    let mut cmd = launch.to_command();
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP.0 | CREATE_NO_WINDOW.0);

    // Dropping the `Child` closes its process and thread handles.
    let child = cmd.spawn().map_err(|e| launch.spawn_error(e))?;
    Ok(child.id())
}

pub fn probe(pid: u32) -> PlatformResult<ProbeState> {
    let process = match ProcessHandle::open(pid, PROCESS_QUERY_LIMITED_INFORMATION) {
        Ok(process) => process,
        // the id no longer names a process
        Err(PlatformError::NotFound { .. }) => return Ok(ProbeState::Exited { exit_code: None }),
        Err(e) => return Err(e),
    };

    let mut exit_code: u32 = 0;
    unsafe { GetExitCodeProcess(process.handle(), &mut exit_code) }.map_err(|e| {
        PlatformError::Probe {
            pid,
            detail: e.to_string(),
        }
    })?;

    if exit_code == STILL_ACTIVE {
        Ok(ProbeState::Alive)
    } else {
        Ok(ProbeState::Exited {
            exit_code: Some(exit_code as i32),
        })
    }
}

/// Windows has no graceful signal for arbitrary GUI processes, so both
/// modes end in `TerminateProcess`.
pub fn request_termination(pid: u32, _mode: TerminationMode) -> PlatformResult<()> {
    let process = ProcessHandle::open(pid, PROCESS_TERMINATE)?;

    unsafe { TerminateProcess(process.handle(), TERMINATED_EXIT_CODE) }.map_err(|e| {
        PlatformError::Signal {
            pid,
            detail: e.to_string(),
        }
    })
}
