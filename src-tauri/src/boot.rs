// Boot sequence
// settings -> port -> launch plan -> launch -> readiness -> first window ->
// health monitor. Fatal failures end in a blocking dialog and exit code 1.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backend_paths::BackendPlan;
use crate::config::Config;
use crate::errors::SupervisorError;
use crate::settings_store::SettingsStore;
use crate::shell::DesktopShell;
use crate::supervisor::port::find_available_port;
use crate::supervisor::{LaunchOutcome, Supervisor, SupervisorStatus};
use crate::window::{WindowState, WindowStateMachine};

pub const FATAL_EXIT_CODE: i32 = 1;

pub struct BootContext {
    pub config: Config,
    pub supervisor: Supervisor,
    pub shell: Arc<dyn DesktopShell>,
    /// How to launch the backend; a resolution failure is fatal at boot
    pub plan: crate::errors::Result<BackendPlan>,
}

/// A backend that answered and the window that was shown for it
pub struct Booted {
    pub port: u16,
    pub url: String,
    shell: Arc<dyn DesktopShell>,
    windows: Mutex<WindowStateMachine>,
    exhaustion_watcher: JoinHandle<()>,
}

impl Booted {
    pub fn window_state(&self) -> WindowState {
        self.lock_windows().state()
    }

    /// Setup finished: drop the setup window and show the main one
    pub fn complete_setup(&self) -> Result<()> {
        let next = self.lock_windows().complete_setup()?;
        self.shell.dispose_setup();
        self.shell.present(next)
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, WindowStateMachine> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Booted {
    fn drop(&mut self) {
        self.exhaustion_watcher.abort();
    }
}

pub async fn boot(ctx: BootContext) -> Result<Booted> {
    let BootContext {
        config,
        supervisor,
        shell,
        plan,
    } = ctx;
    let log_file = config.log_file();

    let settings = match SettingsStore::load(&config.settings_file) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(
                "Could not read settings from {}: {}; using defaults",
                config.settings_file.display(),
                e
            );
            SettingsStore::default()
        }
    };

    let port = match find_available_port(settings.preferred_port()) {
        Ok(port) => port,
        Err(e) => return Err(fatal(&shell, &log_file, "Could not start server", e).await),
    };

    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => return Err(fatal(&shell, &log_file, "Server files missing", e).await),
    };

    let exhaustion_watcher = spawn_exhaustion_watcher(&supervisor, shell.clone(), log_file.clone());

    let url = format!("http://127.0.0.1:{}/", port);
    info!("Booting backend on port {}", port);
    if let LaunchOutcome::SpawnFailed = supervisor.launch(plan.descriptor(port)) {
        warn!("Initial backend spawn failed; it will be retried");
    }

    if !supervisor.wait_for_ready(&url).await {
        let err = SupervisorError::ReadinessTimeout {
            url: url.clone(),
            timeout: supervisor.settings().readiness_timeout,
        };
        if let SupervisorStatus::Exhausted { .. } = supervisor.status() {
            // The exhaustion watcher already told the user
            error!("{}", err);
            return Err(err.into());
        }
        supervisor.stop().await;
        exhaustion_watcher.abort();
        return Err(fatal(&shell, &log_file, "Server did not start", err).await);
    }

    let mut windows = WindowStateMachine::new();
    let state = windows.on_backend_ready(settings.has_credentials())?;
    shell.present(state)?;

    supervisor.start_health_monitor(url.clone());

    Ok(Booted {
        port,
        url,
        shell,
        windows: Mutex::new(windows),
        exhaustion_watcher,
    })
}

/// Raise the "gave up" dialog and exit once the restart budget is spent
pub fn spawn_exhaustion_watcher(
    supervisor: &Supervisor,
    shell: Arc<dyn DesktopShell>,
    log_file: PathBuf,
) -> JoinHandle<()> {
    let mut status_rx = supervisor.subscribe();
    tokio::spawn(async move {
        loop {
            let status = status_rx.borrow_and_update().clone();
            if let SupervisorStatus::Exhausted { attempts } = status {
                let message = format!(
                    "The VMS server crashed {} times in a row and will not be restarted.",
                    attempts
                );
                show_fatal(&shell, &log_file, "Server failed repeatedly", message).await;
                return;
            }
            if status_rx.changed().await.is_err() {
                return;
            }
        }
    })
}

async fn fatal(
    shell: &Arc<dyn DesktopShell>,
    log_file: &Path,
    title: &'static str,
    err: impl Into<anyhow::Error>,
) -> anyhow::Error {
    let err = err.into();
    error!("{}: {:#}", title, err);
    show_fatal(shell, log_file, title, format!("{:#}", err)).await;
    anyhow!("{}: {:#}", title, err)
}

/// Blocking dialog off the async threads, then exit with the fatal code
async fn show_fatal(shell: &Arc<dyn DesktopShell>, log_file: &Path, title: &str, detail: String) {
    let message = format!(
        "{}\n\nCheck the log for details:\n{}",
        detail,
        log_file.display()
    );
    let dialog_shell = shell.clone();
    let title_owned = title.to_string();
    if let Err(e) = tokio::task::spawn_blocking(move || {
        dialog_shell.show_fatal_error(&title_owned, &message)
    })
    .await
    {
        error!("Fatal error dialog failed: {}", e);
    }
    shell.exit(FATAL_EXIT_CODE);
}
