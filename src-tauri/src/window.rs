// Window presentation state
// Booting -> Setup -> Main, or Booting -> Main. Never backwards within a session.

use serde::Serialize;

use crate::errors::{Result, SupervisorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Booting,
    Setup,
    Main,
}

impl WindowState {
    /// Label used for the window in the shell
    pub fn label(&self) -> &'static str {
        match self {
            WindowState::Booting => "booting",
            WindowState::Setup => "setup",
            WindowState::Main => "main",
        }
    }

    fn can_move_to(self, next: WindowState) -> bool {
        matches!(
            (self, next),
            (WindowState::Booting, WindowState::Setup)
                | (WindowState::Booting, WindowState::Main)
                | (WindowState::Setup, WindowState::Main)
        )
    }
}

#[derive(Debug)]
pub struct WindowStateMachine {
    state: WindowState,
}

impl Default for WindowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStateMachine {
    pub fn new() -> Self {
        Self {
            state: WindowState::Booting,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// First transition once the backend answers: Main when credentials are
    /// stored, otherwise Setup.
    pub fn on_backend_ready(&mut self, has_credentials: bool) -> Result<WindowState> {
        let next = if has_credentials {
            WindowState::Main
        } else {
            WindowState::Setup
        };
        self.transition(next)
    }

    /// The user finished setup
    pub fn complete_setup(&mut self) -> Result<WindowState> {
        if self.state != WindowState::Setup {
            return Err(SupervisorError::InvalidWindowTransition {
                from: self.state,
                to: WindowState::Main,
            });
        }
        self.transition(WindowState::Main)
    }

    fn transition(&mut self, next: WindowState) -> Result<WindowState> {
        if !self.state.can_move_to(next) {
            return Err(SupervisorError::InvalidWindowTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!("Window state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(next)
    }
}
