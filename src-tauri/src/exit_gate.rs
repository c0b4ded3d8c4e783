// Application quit interception
// The first quit request is held back while the backend is stopped; the
// caller exits for real once cleanup is done.

use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Let the application exit now
    Proceed,
    /// Prevent this exit. When `start_cleanup` is set the caller owns the
    /// stop-then-exit sequence; otherwise one is already running.
    Defer { start_cleanup: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    CleaningUp,
    Done,
}

#[derive(Debug)]
pub struct ExitGate {
    phase: Mutex<Phase>,
}

impl Default for ExitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitGate {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Running),
        }
    }

    pub fn on_exit_requested(&self, installing_update: bool) -> ExitDecision {
        // The updater terminates the app itself and the backend is already stopped
        if installing_update {
            debug!("Exit requested during update install; not intercepting");
            return ExitDecision::Proceed;
        }

        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        match *phase {
            Phase::Running => {
                info!("Exit requested; stopping backend first");
                *phase = Phase::CleaningUp;
                ExitDecision::Defer {
                    start_cleanup: true,
                }
            }
            Phase::CleaningUp => {
                debug!("Exit requested while cleanup in progress; waiting");
                ExitDecision::Defer {
                    start_cleanup: false,
                }
            }
            Phase::Done => ExitDecision::Proceed,
        }
    }

    /// Mark the backend as stopped so the next exit request goes through
    pub fn mark_cleanup_done(&self) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = Phase::Done;
    }
}
