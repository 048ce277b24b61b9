//! Supervises externally launched applications for a host program.
//!
//! A [`Supervisor`] starts child processes under caller-chosen ids, keeps a
//! run record for each one, notices when they exit on their own and can
//! terminate them on request. Platform specifics live behind
//! [`platform::ProcessControl`].

pub mod config;
pub mod error;
pub mod events;
pub mod icon;
pub mod ipc;
pub mod monitor;
pub mod platform;
pub mod record;
pub mod registry;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{PlatformError, SupervisorError};
pub use events::LifecycleEvent;
pub use icon::IconSource;
pub use platform::{NativeProcessControl, ProbeState, ProcessControl, TerminationMode};
pub use record::{AppRunRecord, RunStatus};
pub use supervisor::Supervisor;
