// Restart budget over a sliding window

use std::time::Duration;
use tokio::time::Instant;

/// Attempt counter for one restart window.
///
/// Every launch, the first one included, spends one attempt. Once the budget
/// is spent the ledger refuses until the window has elapsed or it is reset
/// by an operator-initiated relaunch.
#[derive(Debug, Clone)]
pub struct RestartLedger {
    max_attempts: u32,
    window: Duration,
    attempts: u32,
    window_started_at: Option<Instant>,
}

/// Refusal returned once the budget for the current window is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub window: Duration,
}

impl RestartLedger {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: 0,
            window_started_at: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Spend one attempt, returning its 1-based number within the window
    pub fn try_acquire(&mut self, now: Instant) -> Result<u32, Exhausted> {
        if let Some(started) = self.window_started_at {
            if now.saturating_duration_since(started) > self.window {
                self.attempts = 0;
                self.window_started_at = None;
            }
        }

        if self.attempts >= self.max_attempts {
            return Err(Exhausted {
                attempts: self.attempts,
                window: self.window,
            });
        }

        if self.attempts == 0 {
            self.window_started_at = Some(now);
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.window_started_at = None;
    }
}
