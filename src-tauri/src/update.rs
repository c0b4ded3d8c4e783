// Update coordination
// Update delivery is external; this only relays its events and enforces that
// the backend is fully stopped before an install is handed off.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::shell::DesktopShell;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateEvent {
    Available { version: String },
    Progress { percent: u8 },
    Downloaded { version: String },
    Error { message: String },
}

/// Hands control to whatever installs the downloaded package
pub trait UpdateInstaller: Send + Sync + 'static {
    fn install(&self) -> anyhow::Result<()>;
}

/// Headless builds have no package to install
#[derive(Debug, Default)]
pub struct NoopInstaller;

impl UpdateInstaller for NoopInstaller {
    fn install(&self) -> anyhow::Result<()> {
        info!("No update installer configured in this build; skipping install");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Forwarded,
    Declined,
    Installed,
}

pub struct UpdateCoordinator {
    supervisor: Supervisor,
    shell: Arc<dyn DesktopShell>,
    installer: Arc<dyn UpdateInstaller>,
}

impl UpdateCoordinator {
    pub fn new(
        supervisor: Supervisor,
        shell: Arc<dyn DesktopShell>,
        installer: Arc<dyn UpdateInstaller>,
    ) -> Self {
        Self {
            supervisor,
            shell,
            installer,
        }
    }

    /// Run the coordinator on its own task, fed by the returned sender
    pub fn spawn(self) -> (mpsc::Sender<UpdateEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        (tx, tokio::spawn(self.run(rx)))
    }

    pub async fn run(self, mut events: mpsc::Receiver<UpdateEvent>) {
        while let Some(event) = events.recv().await {
            match self.handle(event).await {
                Ok(UpdateOutcome::Installed) => break,
                Ok(_) => {}
                Err(e) => error!("Update install failed: {:#}", e),
            }
        }
    }

    pub async fn handle(&self, event: UpdateEvent) -> anyhow::Result<UpdateOutcome> {
        self.shell.forward_update_event(&event);

        match event {
            UpdateEvent::Downloaded { version } => self.install(version).await,
            UpdateEvent::Error { message } => {
                warn!("Updater reported an error: {}", message);
                Ok(UpdateOutcome::Forwarded)
            }
            UpdateEvent::Available { version } => {
                info!("Update {} available", version);
                Ok(UpdateOutcome::Forwarded)
            }
            UpdateEvent::Progress { .. } => Ok(UpdateOutcome::Forwarded),
        }
    }

    async fn install(&self, version: String) -> anyhow::Result<UpdateOutcome> {
        let shell = self.shell.clone();
        let confirm_version = version.clone();
        let confirmed =
            tokio::task::spawn_blocking(move || shell.confirm_update_install(&confirm_version))
                .await?;
        if !confirmed {
            info!("Update {} install postponed by user", version);
            return Ok(UpdateOutcome::Declined);
        }

        // Stop must complete (or time out) before anything touches the install
        self.supervisor.begin_update_install();
        info!("Stopping backend before installing update {}", version);
        self.supervisor.stop().await;

        info!("Backend stopped; installing update {}", version);
        let installer = self.installer.clone();
        tokio::task::spawn_blocking(move || installer.install()).await??;
        Ok(UpdateOutcome::Installed)
    }
}
