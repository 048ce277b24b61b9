//! Best-effort lifecycle notifications for the host.

use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

use crate::record::{AppRunRecord, RunStatus, format_timestamp};

/// Default per-subscriber buffer; small and fixed so a slow reader cannot
/// grow memory.
pub const DEFAULT_EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LifecycleEvent {
    Launched {
        app_id: String,
        process_id: u32,
        start_time: String,
    },
    /// Natural exit noticed by the monitor.
    Exited {
        app_id: String,
        status: RunStatus,
        exit_code: i32,
        duration: f64,
    },
    /// Caller-initiated termination.
    Terminated { app_id: String, duration: f64 },
}

impl LifecycleEvent {
    pub(crate) fn launched(record: &AppRunRecord) -> Self {
        LifecycleEvent::Launched {
            app_id: record.app_id.clone(),
            process_id: record.process_id,
            start_time: record.start_time.as_ref().map(format_timestamp).unwrap_or_default(),
        }
    }

    pub(crate) fn exited(record: &AppRunRecord) -> Self {
        LifecycleEvent::Exited {
            app_id: record.app_id.clone(),
            status: record.status,
            exit_code: record.exit_code,
            duration: record.duration_seconds,
        }
    }

    pub(crate) fn terminated(record: &AppRunRecord) -> Self {
        LifecycleEvent::Terminated {
            app_id: record.app_id.clone(),
            duration: record.duration_seconds,
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            LifecycleEvent::Launched { app_id, .. }
            | LifecycleEvent::Exited { app_id, .. }
            | LifecycleEvent::Terminated { app_id, .. } => app_id,
        }
    }
}

/// Fan-out of [`LifecycleEvent`]s to any number of subscribers.
///
/// Publishing never blocks: a full subscriber misses the event, a dropped
/// one is forgotten.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LifecycleEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: LifecycleEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("subscriber lagging, dropped event for {}", event.app_id());
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
