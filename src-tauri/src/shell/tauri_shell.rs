// Tauri window shell

use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tracing::{info, warn};

use super::DesktopShell;
use crate::update::{UpdateEvent, UpdateInstaller};
use crate::window::WindowState;

pub const UPDATE_EVENT: &str = "update-event";

pub struct TauriShell {
    app: AppHandle,
}

impl TauriShell {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl DesktopShell for TauriShell {
    fn present(&self, state: WindowState) -> anyhow::Result<()> {
        let label = state.label();
        if let Some(window) = self.app.get_webview_window(label) {
            window.show()?;
            window.set_focus()?;
            return Ok(());
        }

        let (page, title, width, height) = match state {
            WindowState::Setup => ("setup.html", "VMS Desktop Setup", 520.0, 640.0),
            WindowState::Main => ("index.html", "VMS Desktop", 1280.0, 800.0),
            WindowState::Booting => return Ok(()),
        };

        WebviewWindowBuilder::new(&self.app, label, WebviewUrl::App(page.into()))
            .title(title)
            .inner_size(width, height)
            .build()?;
        info!("Opened {} window", label);
        Ok(())
    }

    fn dispose_setup(&self) {
        if let Some(window) = self.app.get_webview_window(WindowState::Setup.label()) {
            if let Err(e) = window.destroy() {
                warn!("Failed to close setup window: {}", e);
            }
        }
    }

    fn forward_update_event(&self, event: &UpdateEvent) {
        if let Err(e) = self.app.emit(UPDATE_EVENT, event) {
            warn!("Failed to forward update event: {}", e);
        }
    }

    fn confirm_update_install(&self, version: &str) -> bool {
        self.app
            .dialog()
            .message(format!(
                "Version {} has been downloaded. The app will close the server and restart to install it.",
                version
            ))
            .title("Update ready")
            .kind(MessageDialogKind::Info)
            .buttons(MessageDialogButtons::OkCancelCustom(
                "Install and restart".into(),
                "Later".into(),
            ))
            .blocking_show()
    }

    fn show_fatal_error(&self, title: &str, message: &str) {
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .blocking_show();
    }

    fn exit(&self, code: i32) {
        self.app.exit(code);
    }
}

/// Relaunches the app so the downloaded package takes over
pub struct RelaunchInstaller {
    app: AppHandle,
}

impl RelaunchInstaller {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl UpdateInstaller for RelaunchInstaller {
    fn install(&self) -> anyhow::Result<()> {
        info!("Relaunching to finish update install");
        self.app.restart()
    }
}
