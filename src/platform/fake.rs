//! Scriptable in-memory [`ProcessControl`] for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{ProbeState, ProcessControl, TerminationMode};
use crate::error::{PlatformError, PlatformResult};

const FIRST_PID: u32 = 1000;

#[derive(Debug, Default)]
struct FakeState {
    next_pid: u32,
    spawned: Vec<String>,
    processes: HashMap<u32, ProbeState>,
    probe_failures: HashSet<u32>,
    terminations: Vec<(u32, TerminationMode)>,
    probes: usize,
    fail_spawn: bool,
    fail_terminate: bool,
}

#[derive(Debug, Default)]
pub struct FakeControl {
    state: Mutex<FakeState>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned.len()
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().unwrap().probes
    }

    pub fn terminations(&self) -> Vec<(u32, TerminationMode)> {
        self.state.lock().unwrap().terminations.clone()
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.state.lock().unwrap().fail_spawn = fail;
    }

    pub fn fail_terminations(&self, fail: bool) {
        self.state.lock().unwrap().fail_terminate = fail;
    }

    /// Make `pid` look like it exited with `exit_code`.
    pub fn exit(&self, pid: u32, exit_code: Option<i32>) {
        self.state
            .lock()
            .unwrap()
            .processes
            .insert(pid, ProbeState::Exited { exit_code });
    }

    /// Make probes of `pid` fail as if it vanished between sweeps.
    pub fn vanish(&self, pid: u32) {
        let mut state = self.state.lock().unwrap();
        state.processes.remove(&pid);
        state.probe_failures.insert(pid);
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().processes.get(&pid) == Some(&ProbeState::Alive)
    }
}

impl ProcessControl for FakeControl {
    fn spawn(&self, executable_path: &str) -> PlatformResult<u32> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spawn || executable_path.trim().is_empty() {
            return Err(PlatformError::Spawn {
                command: executable_path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        let pid = FIRST_PID + state.next_pid;
        state.next_pid += 1;
        state.spawned.push(executable_path.to_string());
        state.processes.insert(pid, ProbeState::Alive);
        Ok(pid)
    }

    fn probe(&self, pid: u32) -> PlatformResult<ProbeState> {
        let mut state = self.state.lock().unwrap();
        state.probes += 1;
        if state.probe_failures.contains(&pid) {
            return Err(PlatformError::Probe {
                pid,
                detail: "vanished".into(),
            });
        }
        Ok(state
            .processes
            .get(&pid)
            .copied()
            .unwrap_or(ProbeState::Exited { exit_code: None }))
    }

    fn request_termination(&self, pid: u32, mode: TerminationMode) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_terminate {
            return Err(PlatformError::Signal {
                pid,
                detail: "operation not permitted".into(),
            });
        }
        if state.processes.get(&pid) != Some(&ProbeState::Alive) {
            return Err(PlatformError::NotFound { pid });
        }
        state.terminations.push((pid, mode));
        let exit_code = match mode {
            TerminationMode::Graceful => 143,
            TerminationMode::Forced => 137,
        };
        state.processes.insert(
            pid,
            ProbeState::Exited {
                exit_code: Some(exit_code),
            },
        );
        Ok(())
    }
}
