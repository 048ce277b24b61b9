//! Public operation surface: launch, terminate, status and list.
//!
//! Each operation runs to completion on the calling thread. Operations that
//! combine a registry check with an OS call (launch, terminate) hold the
//! registry lock across that call, so they are atomic with respect to each
//! other and to the monitor sweep.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result as AnyResult;
use chrono::Local;
use crossbeam_channel::Receiver;
use log::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{PlatformError, Result, SupervisorError};
use crate::events::{EventBus, LifecycleEvent};
use crate::icon::IconSource;
use crate::monitor::LifecycleMonitor;
use crate::platform::{NativeProcessControl, ProbeState, ProcessControl, TerminationMode};
use crate::record::AppRunRecord;
use crate::registry::{ProcessRegistry, TERMINATED_EXIT_CODE};

/// How long shutdown waits for terminated children to be collected.
const SHUTDOWN_REAP_GRACE: Duration = Duration::from_secs(1);
const SHUTDOWN_REAP_POLL: Duration = Duration::from_millis(10);

/// How a terminate request ended inside the critical section.
enum Ended {
    Terminated(Option<AppRunRecord>),
    /// The process was already gone when we tried to signal it.
    AlreadyExited(Option<AppRunRecord>),
}

/// Supervises child applications keyed by caller-chosen ids.
///
/// Owns its registry and monitor thread; any number of supervisors can
/// coexist. Dropping it stops the monitor (see [`Supervisor::shutdown`]).
pub struct Supervisor {
    registry: Arc<ProcessRegistry>,
    control: Arc<dyn ProcessControl>,
    events: Arc<EventBus>,
    icons: Option<Box<dyn IconSource>>,
    monitor: Mutex<Option<LifecycleMonitor>>,
    config: SupervisorConfig,
}

impl Supervisor {
    /// Supervisor driving real OS processes.
    pub fn new(config: SupervisorConfig) -> AnyResult<Self> {
        Self::with_control(config, Arc::new(NativeProcessControl))
    }

    pub fn with_control(config: SupervisorConfig, control: Arc<dyn ProcessControl>) -> AnyResult<Self> {
        let registry = Arc::new(ProcessRegistry::new());
        let events = Arc::new(EventBus::new(config.event_buffer));
        let monitor = LifecycleMonitor::start(
            registry.clone(),
            control.clone(),
            events.clone(),
            config.monitor_interval(),
        )?;

        Ok(Self {
            registry,
            control,
            events,
            icons: None,
            monitor: Mutex::new(Some(monitor)),
            config,
        })
    }

    pub fn with_icon_source(mut self, source: impl IconSource + 'static) -> Self {
        self.icons = Some(Box::new(source));
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start `executable_path` under `app_id`.
    ///
    /// Rejected without spawning anything if `app_id` is already running. A
    /// finished record for the same id is replaced.
    pub fn launch(&self, app_id: &str, executable_path: &str) -> Result<AppRunRecord> {
        if app_id.is_empty() {
            return Err(SupervisorError::LaunchFailed {
                app_id: String::new(),
                detail: "application id must not be empty".into(),
            });
        }

        let record = {
            let mut table = self.registry.lock();
            if table.is_running(app_id) {
                warn!("launch of {app_id} rejected: already running");
                return Err(SupervisorError::AlreadyRunning {
                    app_id: app_id.to_string(),
                });
            }

            let pid = self.control.spawn(executable_path).map_err(|e| {
                error!("failed to launch {app_id}: {e}");
                SupervisorError::LaunchFailed {
                    app_id: app_id.to_string(),
                    detail: e.to_string(),
                }
            })?;
            table.try_insert_running(app_id, pid, Local::now())?
        };

        info!("launched {app_id} (pid {}): {executable_path}", record.process_id);
        self.events.publish(LifecycleEvent::launched(&record));
        Ok(record)
    }

    /// Gracefully terminate `app_id`. The record becomes `completed` with
    /// exit code 0 as soon as the OS accepts the request.
    pub fn terminate(&self, app_id: &str) -> Result<AppRunRecord> {
        self.end(app_id, TerminationMode::Graceful)
    }

    /// Like [`Supervisor::terminate`] but uncatchable where the OS allows.
    pub fn force_terminate(&self, app_id: &str) -> Result<AppRunRecord> {
        self.end(app_id, TerminationMode::Forced)
    }

    fn end(&self, app_id: &str, mode: TerminationMode) -> Result<AppRunRecord> {
        let ended = {
            let mut table = self.registry.lock();
            let pid = table
                .process_id(app_id)
                .ok_or_else(|| SupervisorError::not_found(app_id))?;

            match self.control.request_termination(pid, mode) {
                Ok(()) => {
                    table.remove_process_mapping(app_id);
                    table.park_for_reaping(pid);
                    Ended::Terminated(table.finalize_from_termination(app_id, Local::now(), TERMINATED_EXIT_CODE))
                }
                Err(PlatformError::NotFound { .. }) => {
                    let exit_code = match self.control.probe(pid) {
                        Ok(ProbeState::Exited {
                            exit_code: Some(code),
                        }) => code,
                        _ => TERMINATED_EXIT_CODE,
                    };
                    table.remove_process_mapping(app_id);
                    Ended::AlreadyExited(table.finalize_from_exit(app_id, Local::now(), exit_code))
                }
                Err(e) => {
                    error!("failed to terminate {app_id} (pid {pid}): {e}");
                    return Err(SupervisorError::TerminationFailed {
                        app_id: app_id.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        };

        match ended {
            Ended::Terminated(Some(record)) => {
                info!("terminated {app_id} after {}s ({mode:?})", record.duration_seconds);
                self.events.publish(LifecycleEvent::terminated(&record));
                Ok(record)
            }
            Ended::Terminated(None) => Err(SupervisorError::not_found(app_id)),
            Ended::AlreadyExited(record) => {
                if let Some(record) = record {
                    info!("{app_id} had already exited → {}", record.status);
                    self.events.publish(LifecycleEvent::exited(&record));
                }
                Err(SupervisorError::not_found(app_id))
            }
        }
    }

    /// Snapshot of `app_id`'s record; the zero-value record if unknown.
    pub fn status(&self, app_id: &str) -> AppRunRecord {
        self.registry.get(app_id).unwrap_or_default()
    }

    /// Every tracked record, running or finished, sorted by app id.
    pub fn list_running(&self) -> Vec<AppRunRecord> {
        self.registry.list_all()
    }

    pub fn running_count(&self) -> usize {
        self.registry.lock().running_count()
    }

    /// Whole seconds `app_id` has been running, its final duration once
    /// finished, 0 if unknown.
    pub fn elapsed(&self, app_id: &str) -> f64 {
        self.registry
            .get(app_id)
            .map(|record| record.elapsed_at(Local::now()))
            .unwrap_or_default()
    }

    /// Remove a finished record.
    pub fn forget(&self, app_id: &str) -> Result<AppRunRecord> {
        self.registry.lock().forget(app_id)
    }

    /// Remove every finished record; returns how many were dropped.
    pub fn prune_finished(&self) -> usize {
        self.registry.lock().prune_finished()
    }

    /// True if any record changed since the last call.
    pub fn take_modification(&self) -> bool {
        self.registry.lock().take_modified()
    }

    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Forward an icon lookup to the configured collaborator.
    pub fn icon(&self, executable_path: &str) -> Option<Vec<u8>> {
        self.icons
            .as_ref()
            .and_then(|source| source.icon_for(Path::new(executable_path)))
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(LifecycleMonitor::is_running)
    }

    /// Stop and join the monitor. With `terminate_on_shutdown` every app
    /// still running is sent a graceful termination. Terminated children are
    /// then collected for up to a second. Idempotent.
    pub fn shutdown(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut monitor) = monitor else {
            return;
        };
        monitor.stop();

        if self.config.terminate_on_shutdown {
            let active = self.registry.lock().active_mappings();
            for (app_id, _) in active {
                if let Err(e) = self.terminate(&app_id) {
                    warn!("shutdown: could not terminate {app_id}: {e}");
                }
            }
        }
        self.reap_terminated(SHUTDOWN_REAP_GRACE);
        info!("supervisor shut down");
    }

    /// Probe parked pids until all are collected or `grace` runs out; the
    /// monitor is gone, so nothing else will.
    fn reap_terminated(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            let left = {
                let mut table = self.registry.lock();
                table.retain_reaping(|pid| matches!(self.control.probe(pid), Ok(ProbeState::Alive)));
                table.reaping_count()
            };
            if left == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!("shutdown: {left} terminated process(es) still not collected");
                return;
            }
            std::thread::sleep(SHUTDOWN_REAP_POLL);
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
