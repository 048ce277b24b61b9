use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_EVENT_BUFFER;
use crate::monitor::DEFAULT_SWEEP_INTERVAL;

const CONFIG_DIR: &str = "app-supervisor";
const CONFIG_FILE: &str = "app-supervisor.toml";

fn default_monitor_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

/// Top‑level supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How often the lifecycle monitor sweeps tracked processes.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Send a graceful termination to every running app on shutdown.
    #[serde(default)]
    pub terminate_on_shutdown: bool,
    /// Buffered lifecycle events per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            terminate_on_shutdown: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl SupervisorConfig {
    /// Monitor interval, never below one millisecond.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse supervisor config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Explicit path if given (must exist), else the per-user config file
    /// when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                log::info!("Using config from: {}", path.display());
                Self::from_file(&path)
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// `<config dir>/app-supervisor/app-supervisor.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
