// Backend launch resolution
// Decides how the backend is started: a developer-supplied shell command, or
// the packaged interpreter + entry script shipped next to the app binary.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{Result, SupervisorError};
use crate::supervisor::launcher::LaunchDescriptor;

/// Shell command line used instead of the packaged backend
pub const DEV_COMMAND_ENV: &str = "VMS_BACKEND_DEV_COMMAND";
/// Interpreter for the packaged entry script
pub const RUNTIME_ENV: &str = "VMS_BACKEND_RUNTIME";
/// Explicit entry script, tried after the bundled locations
pub const ENTRY_ENV: &str = "VMS_BACKEND_ENTRY";

pub const DEFAULT_RUNTIME: &str = "node";
const ENTRY_FILE: &str = "server.js";

/// Where the bundled entry script may live relative to the executable's directory
pub fn bundled_entry_candidates(exe_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![
        exe_dir.join("backend").join(ENTRY_FILE),
        exe_dir.join("resources").join("backend").join(ENTRY_FILE),
    ];

    // App bundles keep resources beside the MacOS/ directory
    #[cfg(target_os = "macos")]
    candidates.push(
        exe_dir
            .join("..")
            .join("Resources")
            .join("backend")
            .join(ENTRY_FILE),
    );

    candidates
}

/// First existing entry script: bundled locations, then the explicit override
pub fn resolve_backend_entry(exe_dir: &Path, explicit: Option<PathBuf>) -> Result<PathBuf> {
    let mut searched = bundled_entry_candidates(exe_dir);
    searched.extend(explicit);

    for candidate in &searched {
        debug!("Looking for backend entry at {}", candidate.display());
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }

    Err(SupervisorError::BackendNotFound { searched })
}

/// Directory holding the running executable
pub fn current_exe_dir() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine exe directory",
        )
    })
}

/// How the backend will be launched for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendPlan {
    Development { command: String, cwd: PathBuf },
    Packaged { runtime: String, entry: PathBuf },
}

impl BackendPlan {
    /// Resolve from the process environment and the executable's location
    pub fn from_env() -> Result<Self> {
        let exe_dir = current_exe_dir()?;
        let cwd = std::env::current_dir()?;
        Self::resolve(&exe_dir, &cwd, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(exe_dir: &Path, cwd: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(command) = non_empty(DEV_COMMAND_ENV) {
            return Ok(BackendPlan::Development {
                command,
                cwd: cwd.to_path_buf(),
            });
        }

        let runtime = non_empty(RUNTIME_ENV).unwrap_or_else(|| DEFAULT_RUNTIME.to_string());
        let entry = resolve_backend_entry(exe_dir, non_empty(ENTRY_ENV).map(PathBuf::from))?;
        Ok(BackendPlan::Packaged { runtime, entry })
    }

    /// The descriptor every (re)launch of this run will use
    pub fn descriptor(&self, port: u16) -> LaunchDescriptor {
        let descriptor = match self {
            BackendPlan::Development { command, cwd } => {
                info!("Using development backend command: {}", command);
                LaunchDescriptor::shell(command.clone(), cwd.clone())
                    .with_env("APP_ENV", "development")
            }
            BackendPlan::Packaged { runtime, entry } => {
                info!("Using packaged backend at {}", entry.display());
                let cwd = entry
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                LaunchDescriptor::script(
                    runtime.clone(),
                    [entry.to_string_lossy().into_owned()],
                    cwd,
                )
                .with_env("APP_ENV", "production")
            }
        };
        descriptor.with_env("PORT", port.to_string())
    }
}
