//! Run records kept for every application id the supervisor knows about.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// Millisecond precision local timestamp, e.g. `2025-03-01T14:02:11.512`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Zero value reported for ids the supervisor has never seen.
    #[default]
    Unknown,
    Running,
    Completed,
    Crashed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Crashed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Unknown => "unknown",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Crashed => "crashed",
        }
    }

    /// `completed` for a clean exit, `crashed` for anything else.
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Crashed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle snapshot of one launch.
///
/// `end_time`, `duration_seconds` and `exit_code` are only meaningful once
/// `status` is terminal. Records handed out by the registry are copies.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRunRecord {
    pub app_id: String,
    pub process_id: u32,
    #[serde(serialize_with = "serialize_timestamp")]
    pub start_time: Option<DateTime<Local>>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end_time: Option<DateTime<Local>>,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    pub status: RunStatus,
    pub exit_code: i32,
}

impl AppRunRecord {
    pub(crate) fn running(app_id: &str, process_id: u32, start_time: DateTime<Local>) -> Self {
        Self {
            app_id: app_id.to_string(),
            process_id,
            start_time: Some(start_time),
            end_time: None,
            duration_seconds: 0.0,
            status: RunStatus::Running,
            exit_code: 0,
        }
    }

    /// False for the zero-value record returned for unknown ids.
    pub fn is_known(&self) -> bool {
        !self.app_id.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Moves a running record into a terminal state. Terminal records are
    /// left untouched; returns whether the transition happened.
    pub(crate) fn finalize(&mut self, end_time: DateTime<Local>, status: RunStatus, exit_code: i32) -> bool {
        if !self.is_running() || !status.is_terminal() {
            return false;
        }
        self.end_time = Some(end_time);
        self.duration_seconds = self
            .start_time
            .map(|start| whole_seconds_between(start, end_time))
            .unwrap_or_default();
        self.status = status;
        self.exit_code = exit_code;
        true
    }

    /// Seconds the app has been running as of `now`, or its stored duration
    /// once it has finished.
    pub fn elapsed_at(&self, now: DateTime<Local>) -> f64 {
        match (self.status, self.start_time) {
            (RunStatus::Running, Some(start)) => whole_seconds_between(start, now),
            _ => self.duration_seconds,
        }
    }
}

/// `end - start` rounded to whole seconds; never negative.
pub fn whole_seconds_between(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds().max(0);
    (millis as f64 / 1000.0).round()
}

pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn serialize_timestamp<S>(ts: &Option<DateTime<Local>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match ts {
        Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
        None => serializer.serialize_none(),
    }
}
