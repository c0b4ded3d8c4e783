// Environment configuration helpers for the desktop shell
// Handles platform-specific paths for state, logs and the settings store,
// plus the timing knobs the backend supervisor runs with.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Configuration for desktop paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for persistent state (settings store, logs)
    pub state_dir: PathBuf,
    /// Key=value settings store written by the UI layer
    pub settings_file: PathBuf,
    /// Directory holding the append-only desktop log
    pub log_dir: PathBuf,
}

impl Config {
    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        Self::rooted_at(Self::default_state_dir())
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        // VMS_DESKTOP_DIR overrides the whole state tree
        if let Ok(override_dir) = std::env::var("VMS_DESKTOP_DIR") {
            return Self::rooted_at(PathBuf::from(override_dir));
        }

        Self::default_paths()
    }

    /// Lay out every path under a single state directory
    pub fn rooted_at(state_dir: PathBuf) -> Self {
        Self {
            settings_file: state_dir.join("settings.conf"),
            log_dir: state_dir.join("logs"),
            state_dir,
        }
    }

    fn default_state_dir() -> PathBuf {
        // All platforms: ~/.vms-desktop/ (or /tmp/vms-desktop if home unavailable)
        dirs::home_dir()
            .map(|h| h.join(".vms-desktop"))
            .unwrap_or_else(|| PathBuf::from("/tmp/vms-desktop"))
    }

    /// Path of the desktop log file
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("desktop.log")
    }

    /// Ensure state and log directories exist with appropriate permissions
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.state_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

pub const DEFAULT_PORT: u16 = 3130;

const READY_TIMEOUT_ENV: &str = "VMS_BACKEND_READY_TIMEOUT_MS";
const HEALTH_INTERVAL_ENV: &str = "VMS_HEALTH_INTERVAL_MS";
const HEALTH_FAILURE_THRESHOLD_ENV: &str = "VMS_HEALTH_FAILURE_THRESHOLD";

/// Timing and budget knobs for the backend supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Launch attempts allowed inside one restart window
    pub max_restarts: u32,
    /// Sliding window over which launch attempts are counted
    pub restart_window: Duration,
    /// Delay between an unexpected exit and the relaunch
    pub restart_delay: Duration,
    pub health_interval: Duration,
    pub health_timeout: Duration,
    /// Consecutive unreachable probes before the backend is killed
    pub health_failure_threshold: u32,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    /// How long stop() waits for the exit event before force-killing again
    pub shutdown_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
            restart_delay: Duration::from_secs(2),
            health_interval: Duration::from_secs(15),
            health_timeout: Duration::from_secs(5),
            health_failure_threshold: 1,
            readiness_timeout: Duration::from_secs(30),
            readiness_interval: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

impl SupervisorSettings {
    /// Defaults with overrides from the environment
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a lookup function. Invalid values are logged and ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_positive(READY_TIMEOUT_ENV, lookup(READY_TIMEOUT_ENV)) {
            self.readiness_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_positive(HEALTH_INTERVAL_ENV, lookup(HEALTH_INTERVAL_ENV)) {
            self.health_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_positive(
            HEALTH_FAILURE_THRESHOLD_ENV,
            lookup(HEALTH_FAILURE_THRESHOLD_ENV),
        ) {
            self.health_failure_threshold = u32::try_from(n).unwrap_or(u32::MAX);
        }
        self
    }
}

fn parse_positive(key: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
