//! Error taxonomy shared by the supervisor and its platform layer.

use thiserror::Error;

/// Failures surfaced to callers of [`crate::Supervisor`].
///
/// Every variant is recoverable at the call site; none of them is fatal to
/// the supervisor or its monitor thread.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("application '{app_id}' is already running")]
    AlreadyRunning { app_id: String },

    #[error("failed to launch '{app_id}': {detail}")]
    LaunchFailed { app_id: String, detail: String },

    #[error("application '{app_id}' not found or not running")]
    NotFound { app_id: String },

    #[error("failed to terminate '{app_id}': {detail}")]
    TerminationFailed { app_id: String, detail: String },
}

impl SupervisorError {
    /// Stable name of the error kind, as reported to the host binding.
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::AlreadyRunning { .. } => "AlreadyRunning",
            SupervisorError::LaunchFailed { .. } => "LaunchFailed",
            SupervisorError::NotFound { .. } => "NotFound",
            SupervisorError::TerminationFailed { .. } => "TerminationFailed",
        }
    }

    pub(crate) fn not_found(app_id: &str) -> Self {
        SupervisorError::NotFound {
            app_id: app_id.to_string(),
        }
    }
}

/// Errors raised by a [`crate::platform::ProcessControl`] implementation.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("cannot execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command line")]
    EmptyCommand,

    #[error("no such process: {pid}")]
    NotFound { pid: u32 },

    #[error("probing process {pid} failed: {detail}")]
    Probe { pid: u32, detail: String },

    #[error("signalling process {pid} failed: {detail}")]
    Signal { pid: u32, detail: String },
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;
pub type Result<T> = std::result::Result<T, SupervisorError>;
