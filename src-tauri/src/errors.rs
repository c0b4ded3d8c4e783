use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::window::WindowState;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn backend '{program}': {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend exited unexpectedly (code: {code:?}, signal: {signal:?})")]
    UnexpectedExit {
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("Backend failed {attempts} times within {window:?}; giving up")]
    RestartExhausted { attempts: u32, window: Duration },

    #[error("Backend did not answer at {url} within {timeout:?}")]
    ReadinessTimeout { url: String, timeout: Duration },

    #[error("Backend entry point not found (searched: {})", format_candidates(.searched))]
    BackendNotFound { searched: Vec<PathBuf> },

    #[error("Failed to find a free port starting at {preferred}: {source}")]
    PortNegotiation {
        preferred: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid window transition from {from:?} to {to:?}")]
    InvalidWindowTransition { from: WindowState, to: WindowState },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_candidates(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
