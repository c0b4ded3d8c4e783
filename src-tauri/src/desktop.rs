// Tauri application wiring: plugins, managed state, commands and quit handling

use std::sync::{Arc, OnceLock};
use tauri::{AppHandle, Manager, RunEvent, State};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::backend_paths::BackendPlan;
use crate::boot::{self, BootContext, Booted};
use crate::config::{Config, SupervisorSettings};
use crate::exit_gate::{ExitDecision, ExitGate};
use crate::shell::tauri_shell::{RelaunchInstaller, TauriShell};
use crate::shell::DesktopShell;
use crate::supervisor::health::HttpProbe;
use crate::supervisor::launcher::OsProcessBackend;
use crate::supervisor::{LaunchOutcome, Supervisor, SupervisorStatus};
use crate::update::{UpdateCoordinator, UpdateEvent};

struct DesktopState {
    supervisor: Supervisor,
    exit_gate: Arc<ExitGate>,
    booted: OnceLock<Booted>,
    updates: mpsc::Sender<UpdateEvent>,
}

#[tauri::command]
fn backend_status(state: State<'_, DesktopState>) -> SupervisorStatus {
    state.supervisor.status()
}

#[tauri::command]
fn complete_setup(state: State<'_, DesktopState>) -> Result<(), String> {
    let booted = state
        .booted
        .get()
        .ok_or_else(|| "The server is still starting".to_string())?;
    booted
        .complete_setup()
        .map_err(|e| format!("Failed to finish setup: {:#}", e))
}

#[tauri::command]
async fn restart_backend(state: State<'_, DesktopState>) -> Result<(), String> {
    match state.supervisor.manual_restart().await {
        LaunchOutcome::Spawned { .. } | LaunchOutcome::AlreadyRunning { .. } => Ok(()),
        other => Err(format!("Server restart failed: {:?}", other)),
    }
}

/// Entry point for whatever delivers updates to the webview
#[tauri::command]
async fn report_update_event(
    state: State<'_, DesktopState>,
    event: UpdateEvent,
) -> Result<(), String> {
    state
        .updates
        .send(event)
        .await
        .map_err(|_| "Update coordinator is not running".to_string())
}

fn setup_app(app: &tauri::App, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let handle = app.handle().clone();
    let shell: Arc<dyn DesktopShell> = Arc::new(TauriShell::new(handle.clone()));

    // Both spawn tasks and need the runtime entered
    let (supervisor, updates) = tauri::async_runtime::block_on(async {
        let supervisor = Supervisor::new(
            SupervisorSettings::from_env(),
            Arc::new(OsProcessBackend),
            Arc::new(HttpProbe::new()),
        );
        let (updates, _) = UpdateCoordinator::new(
            supervisor.clone(),
            shell.clone(),
            Arc::new(RelaunchInstaller::new(handle.clone())),
        )
        .spawn();
        (supervisor, updates)
    });

    app.manage(DesktopState {
        supervisor: supervisor.clone(),
        exit_gate: Arc::new(ExitGate::new()),
        booted: OnceLock::new(),
        updates,
    });

    tauri::async_runtime::spawn(async move {
        let ctx = BootContext {
            config,
            supervisor,
            shell,
            plan: BackendPlan::from_env(),
        };
        match boot::boot(ctx).await {
            Ok(booted) => {
                info!("Backend ready at {}", booted.url);
                let _ = handle.state::<DesktopState>().booted.set(booted);
            }
            Err(e) => error!("Boot failed: {:#}", e),
        }
    });

    Ok(())
}

fn handle_run_event(app: &AppHandle, event: RunEvent) {
    let RunEvent::ExitRequested { api, code, .. } = event else {
        return;
    };
    let state = app.state::<DesktopState>();

    match state
        .exit_gate
        .on_exit_requested(state.supervisor.is_installing_update())
    {
        ExitDecision::Proceed => {}
        ExitDecision::Defer { start_cleanup } => {
            api.prevent_exit();
            if !start_cleanup {
                return;
            }
            let app = app.clone();
            let supervisor = state.supervisor.clone();
            let gate = state.exit_gate.clone();
            tauri::async_runtime::spawn(async move {
                supervisor.stop().await;
                gate.mark_cleanup_done();
                info!("Cleanup finished; exiting");
                app.exit(code.unwrap_or(0));
            });
        }
    }
}

pub fn run(config: Config) {
    tauri::Builder::default()
        .plugin(tauri_plugin_process::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| setup_app(app, config))
        .invoke_handler(tauri::generate_handler![
            backend_status,
            complete_setup,
            restart_backend,
            report_update_event
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(handle_run_event);
}
