//! Background sweep that notices applications exiting on their own.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, error, info, warn};

use crate::events::{EventBus, LifecycleEvent};
use crate::platform::{ProbeState, ProcessControl};
use crate::record::AppRunRecord;
use crate::registry::ProcessRegistry;

/// Reference sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Exit code recorded when the OS no longer knows how the process ended.
const UNKNOWN_EXIT_CODE: i32 = 0;

/// One pass over every actively tracked process.
///
/// Runs entirely inside the registry's critical section so a concurrent
/// terminate either happens before (and the mapping is already gone) or
/// after (and finds nothing left to finalize). Returns the records that
/// were finalized by this pass.
pub fn sweep(registry: &ProcessRegistry, control: &dyn ProcessControl) -> Vec<AppRunRecord> {
    let mut table = registry.lock();
    let mut finished = Vec::new();

    for (app_id, pid) in table.active_mappings() {
        let exit_code = match control.probe(pid) {
            Ok(ProbeState::Alive) => continue,
            Ok(ProbeState::Exited { exit_code }) => exit_code.unwrap_or(UNKNOWN_EXIT_CODE),
            Err(e) => {
                warn!("probe of {app_id} (pid {pid}) failed, treating as exited: {e}");
                UNKNOWN_EXIT_CODE
            }
        };

        if let Some(record) = table.finalize_from_exit(&app_id, Local::now(), exit_code) {
            info!(
                "{app_id} exited on its own → {} (code {}, {}s)",
                record.status, record.exit_code, record.duration_seconds
            );
            finished.push(record);
        }
        table.remove_process_mapping(&app_id);
    }

    // terminated apps: collect the exit status so nothing lingers as a zombie
    table.retain_reaping(|pid| matches!(control.probe(pid), Ok(ProbeState::Alive)));

    debug!(
        "sweep done: {} tracked, {} finalized, {} awaiting reap",
        table.tracked_count(),
        finished.len(),
        table.reaping_count()
    );
    finished
}

/// Handle to the running monitor thread. Dropping it stops and joins the
/// thread.
pub struct LifecycleMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl LifecycleMonitor {
    /// Start sweeping `registry` every `interval`.
    pub fn start(
        registry: Arc<ProcessRegistry>,
        control: Arc<dyn ProcessControl>,
        events: Arc<EventBus>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("lifecycle-monitor".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        // a message or a dropped sender both mean stop
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            for record in sweep(&registry, control.as_ref()) {
                                events.publish(LifecycleEvent::exited(&record));
                            }
                        }
                    }
                }
                debug!("lifecycle monitor stopped");
            })
            .context("Failed to spawn lifecycle monitor thread")?;

        info!("lifecycle monitor started (interval {interval:?})");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it. An in-flight sweep completes
    /// first. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            tx.try_send(()).ok();
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("lifecycle monitor thread panicked");
        }
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeControl;
    use crate::record::RunStatus;
    use std::time::Instant;

    fn launch(registry: &ProcessRegistry, control: &FakeControl, app_id: &str) -> u32 {
        let pid = control.spawn(app_id).unwrap();
        registry
            .lock()
            .try_insert_running(app_id, pid, Local::now())
            .unwrap();
        pid
    }

    #[test]
    fn sweep_finalizes_exited_processes() {
        let registry = ProcessRegistry::new();
        let control = FakeControl::new();
        let ok = launch(&registry, &control, "ok");
        let bad = launch(&registry, &control, "bad");
        launch(&registry, &control, "alive");

        control.exit(ok, Some(0));
        control.exit(bad, Some(3));

        let finished = sweep(&registry, &control);
        assert_eq!(finished.len(), 2);
        assert_eq!(registry.get("ok").unwrap().status, RunStatus::Completed);
        let crashed = registry.get("bad").unwrap();
        assert_eq!(crashed.status, RunStatus::Crashed);
        assert_eq!(crashed.exit_code, 3);
        assert_eq!(registry.get("alive").unwrap().status, RunStatus::Running);
        assert_eq!(registry.lock().active_mappings().len(), 1);
    }

    #[test]
    fn probe_error_counts_as_exit() {
        let registry = ProcessRegistry::new();
        let control = FakeControl::new();
        let pid = launch(&registry, &control, "a");
        control.vanish(pid);

        let finished = sweep(&registry, &control);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, RunStatus::Completed);
        assert_eq!(finished[0].exit_code, UNKNOWN_EXIT_CODE);
        assert!(registry.lock().process_id("a").is_none());
    }

    #[test]
    fn unknown_exit_code_is_completed() {
        let registry = ProcessRegistry::new();
        let control = FakeControl::new();
        let pid = launch(&registry, &control, "a");
        control.exit(pid, None);

        sweep(&registry, &control);
        assert_eq!(registry.get("a").unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn parked_pids_are_dropped_once_gone() {
        let registry = ProcessRegistry::new();
        let control = FakeControl::new();
        let pid = control.spawn("x").unwrap();
        registry.lock().park_for_reaping(pid);

        sweep(&registry, &control);
        assert_eq!(registry.lock().reaping_count(), 1);

        control.exit(pid, Some(0));
        sweep(&registry, &control);
        assert_eq!(registry.lock().reaping_count(), 0);
    }

    #[test]
    fn background_thread_detects_exit_and_stops() {
        let registry = Arc::new(ProcessRegistry::new());
        let control = Arc::new(FakeControl::new());
        let events = Arc::new(EventBus::default());
        let rx = events.subscribe();
        let pid = launch(&registry, &control, "a");

        let mut monitor = LifecycleMonitor::start(
            registry.clone(),
            control.clone(),
            events.clone(),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(monitor.is_running());

        control.exit(pid, Some(1));
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, LifecycleEvent::exited(&registry.get("a").unwrap()));

        let started = Instant::now();
        monitor.stop();
        assert!(!monitor.is_running());
        assert!(started.elapsed() < Duration::from_secs(1));

        // stopped monitor no longer probes
        let probes = control.probe_count();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(control.probe_count(), probes);
        monitor.stop();
    }
}
