// Presentation boundary
// Everything the supervisor needs from the windowing layer. The Tauri shell
// implements it with real windows and dialogs; the console shell is used for
// headless runs.

#[cfg(feature = "desktop")]
pub mod tauri_shell;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::update::UpdateEvent;
use crate::window::WindowState;

pub trait DesktopShell: Send + Sync + 'static {
    /// Show the window for `state`
    fn present(&self, state: WindowState) -> anyhow::Result<()>;

    /// Close the setup window once setup has completed
    fn dispose_setup(&self);

    /// Display-only relay of update progress to whichever window is shown
    fn forward_update_event(&self, event: &UpdateEvent);

    /// Ask the user whether to install `version` now. May block.
    fn confirm_update_install(&self, version: &str) -> bool;

    /// Blocking error dialog. Returns once the user dismissed it.
    fn show_fatal_error(&self, title: &str, message: &str);

    /// End the application with `code`
    fn exit(&self, code: i32);
}

/// Env var that lets a headless run accept downloaded updates unattended
pub const AUTO_INSTALL_ENV: &str = "VMS_AUTO_INSTALL_UPDATES";

/// Headless shell: logs what a window would show and reports exit requests
/// over a channel for the runtime to act on.
pub struct ConsoleShell {
    exit_tx: mpsc::UnboundedSender<i32>,
    auto_install_updates: bool,
}

impl ConsoleShell {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<i32>) {
        let auto_install_updates = std::env::var(AUTO_INSTALL_ENV)
            .map(|v| v.trim() == "1")
            .unwrap_or(false);
        Self::with_auto_install(auto_install_updates)
    }

    pub fn with_auto_install(auto_install_updates: bool) -> (Self, mpsc::UnboundedReceiver<i32>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        (
            Self {
                exit_tx,
                auto_install_updates,
            },
            exit_rx,
        )
    }
}

impl DesktopShell for ConsoleShell {
    fn present(&self, state: WindowState) -> anyhow::Result<()> {
        info!("Presenting {} window", state.label());
        Ok(())
    }

    fn dispose_setup(&self) {
        info!("Setup window disposed");
    }

    fn forward_update_event(&self, event: &UpdateEvent) {
        info!("Update event: {:?}", event);
    }

    fn confirm_update_install(&self, version: &str) -> bool {
        if !self.auto_install_updates {
            info!(
                "Update {} downloaded; set {}=1 to install it unattended",
                version, AUTO_INSTALL_ENV
            );
        }
        self.auto_install_updates
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        eprintln!("\n{}\n{}\n", title, message);
    }

    fn exit(&self, code: i32) {
        let _ = self.exit_tx.send(code);
    }
}
