//! OS process primitives - spawn, probe and terminate by process id
//!
//! Provides a single capability interface over the platform differences:
//! - Unix (Linux/macOS): fork/exec into a new process group, `waitpid`/`kill` via nix
//! - Windows: `CreateProcess` with a new process group, `OpenProcess` handles via the windows crate
//!
//! Nothing here keeps state between calls. Any OS handle opened by an
//! operation is released before it returns.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{PlatformError, PlatformResult};

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix_process;
        use unix_process as platform;
    } else if #[cfg(target_os = "windows")] {
        mod windows_process;
        use windows_process as platform;
    }
}

#[cfg(test)]
pub(crate) mod fake;

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Alive,
    /// The process is gone. `exit_code` is `None` when the OS could only
    /// tell us that it no longer exists.
    Exited { exit_code: Option<i32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationMode {
    /// SIGTERM on Unix, `TerminateProcess` on Windows.
    #[default]
    Graceful,
    /// SIGKILL on Unix, same as graceful on Windows.
    Forced,
}

/// Capability interface over the host OS process API.
pub trait ProcessControl: Send + Sync {
    /// Start a detached child and return its OS process id.
    fn spawn(&self, executable_path: &str) -> PlatformResult<u32>;

    /// Check whether `pid` is still alive without blocking.
    fn probe(&self, pid: u32) -> PlatformResult<ProbeState>;

    /// Ask the OS to end `pid`. Acceptance does not mean the process has
    /// exited yet.
    fn request_termination(&self, pid: u32, mode: TerminationMode) -> PlatformResult<()>;
}

/// [`ProcessControl`] backed by the OS this binary was built for.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessControl;

impl ProcessControl for NativeProcessControl {
    fn spawn(&self, executable_path: &str) -> PlatformResult<u32> {
        let launch = LaunchCommand::parse(executable_path)?;
        platform::spawn(&launch)
    }

    fn probe(&self, pid: u32) -> PlatformResult<ProbeState> {
        platform::probe(pid)
    }

    fn request_termination(&self, pid: u32, mode: TerminationMode) -> PlatformResult<()> {
        platform::request_termination(pid, mode)
    }
}

/// A launch request split into program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchCommand {
    /// The longest whitespace-delimited prefix naming an existing file is
    /// the program (so paths with spaces keep working) and the rest are
    /// arguments. Without such a prefix the first word is the program.
    /// Arguments are always split on whitespace.
    pub fn parse(executable_path: &str) -> PlatformResult<Self> {
        let trimmed = executable_path.trim();
        if trimmed.is_empty() {
            return Err(PlatformError::EmptyCommand);
        }

        let (head, rest) = trimmed
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| trimmed.split_at(i))
            .chain(std::iter::once((trimmed, "")))
            .filter(|(head, _)| !head.ends_with(char::is_whitespace) && Path::new(head).is_file())
            .last()
            .unwrap_or_else(|| trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, "")));

        let program = PathBuf::from(head);
        let args = rest.split_whitespace().map(str::to_string).collect();

        let working_dir = program
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
            .map(Path::to_path_buf);

        Ok(Self {
            program,
            args,
            working_dir,
        })
    }

    pub fn display(&self) -> String {
        let mut shown = self.program.display().to_string();
        for arg in &self.args {
            shown.push(' ');
            shown.push_str(arg);
        }
        shown
    }

    /// Base command shared by every platform: no inherited stdio, cwd at
    /// the program's directory.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    pub(crate) fn spawn_error(&self, source: std::io::Error) -> PlatformError {
        PlatformError::Spawn {
            command: self.display(),
            source,
        }
    }
}
