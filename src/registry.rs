//! Authoritative table of run records and live process mappings.
//!
//! All state sits behind one mutex. Callers that need several steps to be
//! atomic (check, spawn, insert) take [`ProcessRegistry::lock`] once and
//! work on the [`ProcessTable`] directly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use crate::error::{Result, SupervisorError};
use crate::record::{AppRunRecord, RunStatus};

/// Exit code recorded when the caller terminated the app.
pub const TERMINATED_EXIT_CODE: i32 = 0;

#[derive(Debug, Default)]
pub struct ProcessTable {
    /// Every app id ever launched (until forgotten), running or not.
    records: HashMap<String, AppRunRecord>,
    /// app id -> pid, only while the monitor should keep polling it.
    processes: HashMap<String, u32>,
    /// Pids finalized by an explicit terminate that still need reaping.
    reaping: Vec<u32>,
    modified: bool,
}

impl ProcessTable {
    pub fn is_running(&self, app_id: &str) -> bool {
        self.records.get(app_id).is_some_and(AppRunRecord::is_running)
    }

    /// Insert a fresh `running` record, replacing any terminal one.
    pub fn try_insert_running(&mut self, app_id: &str, process_id: u32, start_time: DateTime<Local>) -> Result<AppRunRecord> {
        if self.is_running(app_id) {
            return Err(SupervisorError::AlreadyRunning {
                app_id: app_id.to_string(),
            });
        }

        let record = AppRunRecord::running(app_id, process_id, start_time);
        self.records.insert(app_id.to_string(), record.clone());
        self.processes.insert(app_id.to_string(), process_id);
        self.modified = true;
        Ok(record)
    }

    /// Live mapping for `app_id`, if the monitor still tracks it.
    pub fn process_id(&self, app_id: &str) -> Option<u32> {
        self.processes.get(app_id).copied()
    }

    /// Record a caller-initiated termination. Returns the updated record,
    /// or `None` when there is no running record to finalize.
    pub fn finalize_from_termination(&mut self, app_id: &str, end_time: DateTime<Local>, exit_code: i32) -> Option<AppRunRecord> {
        self.finalize(app_id, end_time, RunStatus::Completed, exit_code)
    }

    /// Record a natural exit: `completed` for 0, `crashed` otherwise.
    pub fn finalize_from_exit(&mut self, app_id: &str, end_time: DateTime<Local>, exit_code: i32) -> Option<AppRunRecord> {
        self.finalize(app_id, end_time, RunStatus::from_exit_code(exit_code), exit_code)
    }

    fn finalize(&mut self, app_id: &str, end_time: DateTime<Local>, status: RunStatus, exit_code: i32) -> Option<AppRunRecord> {
        let record = self.records.get_mut(app_id)?;
        if !record.finalize(end_time, status, exit_code) {
            return None;
        }
        self.modified = true;
        Some(record.clone())
    }

    /// Stop liveness tracking for `app_id`; its record stays queryable.
    pub fn remove_process_mapping(&mut self, app_id: &str) -> Option<u32> {
        self.processes.remove(app_id)
    }

    pub fn get(&self, app_id: &str) -> Option<AppRunRecord> {
        self.records.get(app_id).cloned()
    }

    /// Snapshot of every record, sorted by app id.
    pub fn list_all(&self) -> Vec<AppRunRecord> {
        let mut records: Vec<AppRunRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        records
    }

    /// Snapshot of the `(app id, pid)` pairs the monitor should poll.
    pub fn active_mappings(&self) -> Vec<(String, u32)> {
        let mut mappings: Vec<(String, u32)> = self
            .processes
            .iter()
            .map(|(app_id, pid)| (app_id.clone(), *pid))
            .collect();
        mappings.sort();
        mappings
    }

    pub fn tracked_count(&self) -> usize {
        self.processes.len()
    }

    pub fn running_count(&self) -> usize {
        self.records.values().filter(|r| r.is_running()).count()
    }

    /// Drop a terminal record. Running records must be terminated first.
    pub fn forget(&mut self, app_id: &str) -> Result<AppRunRecord> {
        match self.records.get(app_id) {
            None => Err(SupervisorError::not_found(app_id)),
            Some(record) if record.is_running() => Err(SupervisorError::AlreadyRunning {
                app_id: app_id.to_string(),
            }),
            Some(_) => {
                self.modified = true;
                self.records
                    .remove(app_id)
                    .ok_or_else(|| SupervisorError::not_found(app_id))
            }
        }
    }

    /// Drop every terminal record; returns how many were removed.
    pub fn prune_finished(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.status.is_terminal());
        let removed = before - self.records.len();
        if removed > 0 {
            self.modified = true;
        }
        removed
    }

    /// Returns whether anything changed since the previous call.
    pub fn take_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }

    pub(crate) fn park_for_reaping(&mut self, pid: u32) {
        if !self.reaping.contains(&pid) {
            self.reaping.push(pid);
        }
    }

    /// Keep only the parked pids for which `still_alive` answers true.
    pub(crate) fn retain_reaping(&mut self, mut still_alive: impl FnMut(u32) -> bool) {
        self.reaping.retain(|pid| still_alive(*pid));
    }

    pub fn reaping_count(&self) -> usize {
        self.reaping.len()
    }
}

/// Shared owner of the [`ProcessTable`]. One instance per supervisor.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    table: Mutex<ProcessTable>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the registry's critical section.
    ///
    /// Every table operation leaves both maps consistent, so a poisoned
    /// lock is still safe to reuse.
    pub fn lock(&self) -> MutexGuard<'_, ProcessTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, app_id: &str) -> Option<AppRunRecord> {
        self.lock().get(app_id)
    }

    pub fn list_all(&self) -> Vec<AppRunRecord> {
        self.lock().list_all()
    }
}
