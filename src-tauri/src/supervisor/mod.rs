// Backend process supervisor
// Owns the single embedded backend process: launching it under a restart
// budget, relaunching it after unexpected exits, killing it when it stops
// answering health probes, and tearing its process tree down on stop.
//
// All exit notifications flow through one dispatch task, which is the only
// place a relaunch is scheduled.

pub mod health;
pub mod launcher;
pub mod port;
pub mod readiness;
pub mod restart;
pub mod terminate;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorSettings;
use crate::errors::SupervisorError;

use self::health::{HealthProbe, ProbeOutcome};
use self::launcher::{ExitReport, LaunchDescriptor, ProcessBackend};
use self::restart::RestartLedger;
use self::terminate::TerminateSignal;

/// Lifecycle as observed by the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SupervisorStatus {
    Idle,
    Running {
        pid: u32,
        attempt: u32,
    },
    /// Crashed; a relaunch is scheduled
    Restarting {
        attempts: u32,
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Restart budget spent for the current window; nothing will be relaunched
    Exhausted {
        attempts: u32,
    },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Spawned { pid: u32, attempt: u32 },
    /// A backend is already tracked; nothing was spawned
    AlreadyRunning { pid: u32 },
    Exhausted { attempts: u32 },
    /// Spawn failed; the failure goes through the normal relaunch delay
    SpawnFailed,
    /// Nothing has been launched yet, so there is nothing to relaunch
    NothingToRelaunch,
}

enum SupervisorEvent {
    Exited {
        generation: u64,
        pid: u32,
        report: ExitReport,
    },
    SpawnFailed,
}

struct SupervisedProcess {
    pid: u32,
    /// Distinguishes this child from earlier ones that may still report an exit
    generation: u64,
}

struct State {
    process: Option<SupervisedProcess>,
    /// Descriptor of the last launch, reused verbatim for relaunches
    descriptor: Option<LaunchDescriptor>,
    ledger: RestartLedger,
    stopping: bool,
    stopping_since: Option<Instant>,
    generation: u64,
    exit_waiters: Vec<oneshot::Sender<()>>,
    health_task: Option<JoinHandle<()>>,
    health_url: Option<String>,
    pending_relaunch: Option<JoinHandle<()>>,
}

struct Inner {
    settings: SupervisorSettings,
    backend: Arc<dyn ProcessBackend>,
    probe: Arc<dyn HealthProbe>,
    state: Mutex<State>,
    installing_update: AtomicBool,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    status_tx: watch::Sender<SupervisorStatus>,
}

/// Cheap to clone; all clones drive the same backend.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Must be called from within a tokio runtime: the exit dispatch task starts here.
    pub fn new(
        settings: SupervisorSettings,
        backend: Arc<dyn ProcessBackend>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SupervisorStatus::Idle);

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                process: None,
                descriptor: None,
                ledger: RestartLedger::new(settings.max_restarts, settings.restart_window),
                stopping: false,
                stopping_since: None,
                generation: 0,
                exit_waiters: Vec::new(),
                health_task: None,
                health_url: None,
                pending_relaunch: None,
            }),
            settings,
            backend,
            probe,
            installing_update: AtomicBool::new(false),
            events_tx,
            status_tx,
        });

        tokio::spawn(dispatch_events(Arc::downgrade(&inner), events_rx));

        Self { inner }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    pub fn status(&self) -> SupervisorStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.inner.lock_state().process.as_ref().map(|p| p.pid)
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.lock_state().stopping
    }

    /// Launch attempts spent in the current restart window
    pub fn restart_attempts(&self) -> u32 {
        self.inner.lock_state().ledger.attempts()
    }

    /// Start the backend unless one is already tracked.
    pub fn launch(&self, descriptor: LaunchDescriptor) -> LaunchOutcome {
        self.inner.launch(descriptor)
    }

    /// Poll `url` until the backend answers, bounded by the readiness timeout
    pub async fn wait_for_ready(&self, url: &str) -> bool {
        readiness::wait_for_ready(
            self.inner.probe.as_ref(),
            url,
            self.inner.settings.readiness_timeout,
            self.inner.settings.readiness_interval,
        )
        .await
    }

    /// Mark that an update install is underway. Never cleared: the updater
    /// replaces this process.
    pub fn begin_update_install(&self) {
        info!("Update install starting; health monitoring suspended");
        self.inner.installing_update.store(true, Ordering::SeqCst);
    }

    pub fn is_installing_update(&self) -> bool {
        self.inner.installing_update.load(Ordering::SeqCst)
    }

    /// Start (or replace) the periodic liveness probe against `url`
    pub fn start_health_monitor(&self, url: impl Into<String>) {
        let url = url.into();
        let mut state = self.inner.lock_state();
        if let Some(task) = state.health_task.take() {
            task.abort();
        }
        state.health_url = Some(url.clone());
        state.health_task = Some(tokio::spawn(run_health_monitor(
            Arc::downgrade(&self.inner),
            url,
        )));
    }

    /// Terminate the backend's process tree.
    ///
    /// Always resolves, within the shutdown grace period plus scheduling
    /// slack, whether or not anything is running or the child cooperates.
    /// The restart budget is left untouched.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let (pid, exited) = {
            let mut state = inner.lock_state();
            state.stopping = true;
            state.stopping_since = Some(Instant::now());
            if let Some(task) = state.health_task.take() {
                task.abort();
            }
            if let Some(task) = state.pending_relaunch.take() {
                task.abort();
            }

            let Some(pid) = state.process.as_ref().map(|p| p.pid) else {
                debug!("Stop requested with no backend running");
                inner.mark_stopped();
                return;
            };
            let (tx, rx) = oneshot::channel();
            state.exit_waiters.push(tx);
            (pid, rx)
        };

        info!("Stopping backend pid {}", pid);
        if let Err(e) = inner.backend.terminate_tree(pid, TerminateSignal::Graceful) {
            warn!("Failed to signal backend pid {}: {}", pid, e);
        }

        let grace = inner.settings.shutdown_grace;
        if timeout(grace, exited).await.is_ok() {
            info!("Backend pid {} stopped", pid);
            return;
        }

        warn!(
            "Backend pid {} still running {:?} after stop; force killing",
            pid, grace
        );
        if let Err(e) = inner.backend.terminate_tree(pid, TerminateSignal::Force) {
            warn!("Failed to force kill backend pid {}: {}", pid, e);
        }

        let mut state = inner.lock_state();
        state.exit_waiters.clear();
        if state.process.as_ref().map(|p| p.pid) == Some(pid) {
            state.process = None;
        }
        let since = state.stopping_since.map(|t| t.elapsed());
        drop(state);
        inner.mark_stopped();
        debug!("Stop finished after {:?} without an exit event", since);
    }

    /// Operator-initiated relaunch: stop, forgive past crashes, start again.
    pub async fn manual_restart(&self) -> LaunchOutcome {
        let (descriptor, health_url) = {
            let state = self.inner.lock_state();
            (state.descriptor.clone(), state.health_url.clone())
        };
        let Some(descriptor) = descriptor else {
            warn!("Manual restart requested before any launch");
            return LaunchOutcome::NothingToRelaunch;
        };

        info!("Manual backend restart requested");
        self.stop().await;
        self.inner.lock_state().ledger.reset();

        let outcome = self.launch(descriptor);
        if let (LaunchOutcome::Spawned { .. }, Some(url)) = (outcome, health_url) {
            self.start_health_monitor(url);
        }
        outcome
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_stopped(&self) {
        self.status_tx.send_modify(|status| {
            if !matches!(status, SupervisorStatus::Exhausted { .. }) {
                *status = SupervisorStatus::Stopped;
            }
        });
    }

    fn launch(&self, descriptor: LaunchDescriptor) -> LaunchOutcome {
        let mut state = self.lock_state();
        if let Some(process) = &state.process {
            debug!("Launch ignored: backend pid {} already running", process.pid);
            return LaunchOutcome::AlreadyRunning { pid: process.pid };
        }

        state.descriptor = Some(descriptor.clone());
        let attempt = match state.ledger.try_acquire(Instant::now()) {
            Ok(attempt) => attempt,
            Err(exhausted) => {
                self.report_exhausted(exhausted.attempts);
                return LaunchOutcome::Exhausted {
                    attempts: exhausted.attempts,
                };
            }
        };
        state.stopping = false;
        state.stopping_since = None;

        match self.backend.spawn(&descriptor) {
            Ok(spawned) => {
                state.generation += 1;
                let generation = state.generation;
                let pid = spawned.pid;
                state.process = Some(SupervisedProcess { pid, generation });
                info!(
                    "Backend started (pid {}, attempt {}/{}): {}",
                    pid,
                    attempt,
                    self.settings.max_restarts,
                    descriptor.command_line()
                );

                let events_tx = self.events_tx.clone();
                let exit = spawned.exit;
                tokio::spawn(async move {
                    let report = exit.await;
                    let _ = events_tx.send(SupervisorEvent::Exited {
                        generation,
                        pid,
                        report,
                    });
                });

                self.status_tx
                    .send_replace(SupervisorStatus::Running { pid, attempt });
                LaunchOutcome::Spawned { pid, attempt }
            }
            Err(source) => {
                let err = SupervisorError::SpawnFailure {
                    program: descriptor.program.clone(),
                    source,
                };
                error!("{}", err);
                let _ = self.events_tx.send(SupervisorEvent::SpawnFailed);
                LaunchOutcome::SpawnFailed
            }
        }
    }

    fn report_exhausted(&self, attempts: u32) {
        let err = SupervisorError::RestartExhausted {
            attempts,
            window: self.settings.restart_window,
        };
        error!("{}", err);
        self.status_tx
            .send_replace(SupervisorStatus::Exhausted { attempts });
    }

    fn handle_event(self: &Arc<Self>, event: SupervisorEvent) {
        let mut state = self.lock_state();
        match event {
            SupervisorEvent::Exited {
                generation,
                pid,
                report,
            } => {
                let tracked = state.process.as_ref().map(|p| p.generation) == Some(generation);
                if !tracked {
                    debug!("Ignoring exit of untracked backend pid {}", pid);
                    return;
                }

                // Clear the handle before anything can schedule a relaunch
                state.process = None;
                for waiter in state.exit_waiters.drain(..) {
                    let _ = waiter.send(());
                }

                if state.stopping {
                    info!(
                        "Backend pid {} exited after stop (code {:?}, signal {:?})",
                        pid, report.code, report.signal
                    );
                    drop(state);
                    self.mark_stopped();
                    return;
                }

                let err = SupervisorError::UnexpectedExit {
                    code: report.code,
                    signal: report.signal,
                };
                warn!("{} (pid {})", err, pid);
                self.schedule_relaunch(&mut state, report);
            }
            SupervisorEvent::SpawnFailed => {
                if state.stopping || state.process.is_some() {
                    return;
                }
                self.schedule_relaunch(&mut state, ExitReport::default());
            }
        }
    }

    /// The restart budget is checked by `launch` when the delay fires, so a
    /// crash near the end of a window still gets a fresh one
    fn schedule_relaunch(self: &Arc<Self>, state: &mut State, report: ExitReport) {
        let attempts = state.ledger.attempts();
        let delay = self.settings.restart_delay;
        info!(
            "Backend crashed; retrying in {:?} ({}/{} attempts used)",
            delay, attempts, self.settings.max_restarts
        );
        self.status_tx.send_replace(SupervisorStatus::Restarting {
            attempts,
            code: report.code,
            signal: report.signal,
        });

        if let Some(task) = state.pending_relaunch.take() {
            task.abort();
        }
        let weak = Arc::downgrade(self);
        state.pending_relaunch = Some(tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.relaunch();
            }
        }));
    }

    fn relaunch(&self) {
        let descriptor = {
            let mut state = self.lock_state();
            state.pending_relaunch = None;
            if state.stopping {
                debug!("Relaunch skipped: stop in progress");
                return;
            }
            match state.descriptor.clone() {
                Some(descriptor) => descriptor,
                None => return,
            }
        };
        self.launch(descriptor);
    }

    /// Pid to probe on this tick, or None when the tick must be skipped
    fn health_target(&self) -> Option<u32> {
        if self.installing_update.load(Ordering::SeqCst) {
            return None;
        }
        let state = self.lock_state();
        if state.stopping {
            return None;
        }
        state.process.as_ref().map(|p| p.pid)
    }

    fn kill_unresponsive(&self, pid: u32) {
        // The tick may have raced a stop or a relaunch while probing
        if self.health_target() != Some(pid) {
            return;
        }
        error!(
            "Backend pid {} is unresponsive; force killing its process tree",
            pid
        );
        if let Err(e) = self.backend.terminate_tree(pid, TerminateSignal::Force) {
            warn!("Failed to kill unresponsive backend pid {}: {}", pid, e);
        }
    }
}

async fn dispatch_events(
    inner: Weak<Inner>,
    mut events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
}

async fn run_health_monitor(inner: Weak<Inner>, url: String) {
    let Some(settings) = inner.upgrade().map(|i| i.settings.clone()) else {
        return;
    };
    let threshold = settings.health_failure_threshold.max(1);
    let mut ticker = interval_at(
        Instant::now() + settings.health_interval,
        settings.health_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;
    info!(
        "Health monitor started for {} (every {:?})",
        url, settings.health_interval
    );

    loop {
        ticker.tick().await;
        let Some(supervisor) = inner.upgrade() else {
            return;
        };
        let Some(pid) = supervisor.health_target() else {
            continue;
        };

        match supervisor.probe.probe(&url, settings.health_timeout).await {
            ProbeOutcome::Healthy(status) => {
                failures = 0;
                debug!("Health probe ok (HTTP {})", status);
            }
            ProbeOutcome::Unhealthy(status) => {
                failures = 0;
                warn!(
                    "Backend pid {} answered health probe with HTTP {}; leaving it running",
                    pid, status
                );
            }
            ProbeOutcome::Unreachable(reason) => {
                failures += 1;
                warn!(
                    "Health probe failed for backend pid {} ({}/{}): {}",
                    pid, failures, threshold, reason
                );
                if failures >= threshold {
                    failures = 0;
                    supervisor.kill_unresponsive(pid);
                }
            }
        }
    }
}
