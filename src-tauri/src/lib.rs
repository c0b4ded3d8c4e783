use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};

// Path layout, supervisor timings and env overrides
pub mod config;

// Error taxonomy shared by the supervisor and boot sequence
pub mod errors;

// Backend process lifecycle (launch, restart, health, shutdown)
pub mod supervisor;

// Locating and describing the backend to launch
pub mod backend_paths;

pub mod boot;
pub mod exit_gate;
pub mod logging;
pub mod settings_store;
pub mod shell;
pub mod update;
pub mod window;

#[cfg(feature = "desktop")]
mod desktop;

#[cfg(test)]
pub mod test_utils;

use crate::backend_paths::BackendPlan;
use crate::boot::{BootContext, FATAL_EXIT_CODE};
use crate::config::{Config, SupervisorSettings};
use crate::exit_gate::{ExitDecision, ExitGate};
use crate::shell::{ConsoleShell, DesktopShell};
use crate::supervisor::health::HttpProbe;
use crate::supervisor::launcher::OsProcessBackend;
use crate::supervisor::Supervisor;
use crate::update::{NoopInstaller, UpdateCoordinator};

/// Run the desktop app with Tauri windows
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = Config::from_env();
    if let Err(e) = logging::init(&config) {
        eprintln!("Warning: Failed to initialize logging: {:#}", e);
    }
    desktop::run(config);
}

/// Run the supervisor without windows until interrupted or a fatal error.
/// Returns the process exit code.
pub fn run_headless() -> anyhow::Result<i32> {
    let config = Config::from_env();
    let log_file = logging::init(&config)?;
    info!("VMS desktop starting headless (log: {})", log_file.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    Ok(runtime.block_on(run_headless_async(config)))
}

async fn run_headless_async(config: Config) -> i32 {
    let (console, mut exit_rx) = ConsoleShell::new();
    let shell: Arc<dyn DesktopShell> = Arc::new(console);
    let supervisor = Supervisor::new(
        SupervisorSettings::from_env(),
        Arc::new(OsProcessBackend),
        Arc::new(HttpProbe::new()),
    );
    let exit_gate = ExitGate::new();

    // No update feed in headless mode; keeping the sender alive keeps the
    // coordinator ready for one
    let (_updates, _) =
        UpdateCoordinator::new(supervisor.clone(), shell.clone(), Arc::new(NoopInstaller)).spawn();

    let boot = boot::boot(BootContext {
        config,
        supervisor: supervisor.clone(),
        shell,
        plan: BackendPlan::from_env(),
    });
    tokio::pin!(boot);

    let mut booted = None;
    let mut boot_finished = false;
    let code = loop {
        tokio::select! {
            result = &mut boot, if !boot_finished => {
                boot_finished = true;
                match result {
                    Ok(b) => {
                        info!("Backend ready at {}; press Ctrl+C to stop", b.url);
                        booted = Some(b);
                    }
                    Err(e) => error!("Boot failed: {:#}", e),
                }
            }
            code = exit_rx.recv() => break code.unwrap_or(FATAL_EXIT_CODE),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break 0;
            }
        }
    };

    if let ExitDecision::Defer {
        start_cleanup: true,
    } = exit_gate.on_exit_requested(supervisor.is_installing_update())
    {
        supervisor.stop().await;
        exit_gate.mark_cleanup_done();
    }
    drop(booted);
    info!("Exiting with code {}", code);
    code
}
