//! In-crate fakes for supervisor tests: a process backend whose children exit
//! only when told to, and a health probe that replays scripted outcomes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use super::health::{HealthProbe, ProbeOutcome};
use super::launcher::{ExitReport, LaunchDescriptor, ProcessBackend, SpawnedProcess};
use super::terminate::TerminateSignal;

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

pub(crate) struct FakeBackend {
    next_pid: AtomicU32,
    spawn_calls: AtomicUsize,
    live: Mutex<HashMap<u32, oneshot::Sender<ExitReport>>>,
    descriptors: Mutex<Vec<LaunchDescriptor>>,
    terminations: Mutex<Vec<(u32, TerminateSignal)>>,
    ignore_terminate: AtomicBool,
    fail_spawn: AtomicBool,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            spawn_calls: AtomicUsize::new(0),
            live: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(Vec::new()),
            terminations: Mutex::new(Vec::new()),
            ignore_terminate: AtomicBool::new(false),
            fail_spawn: AtomicBool::new(false),
        })
    }

    /// Make a child exit with `code`. Returns false if it was not alive.
    pub(crate) fn crash(&self, pid: u32, code: i32) -> bool {
        self.exit(
            pid,
            ExitReport {
                code: Some(code),
                signal: None,
            },
        )
    }

    fn exit(&self, pid: u32, report: ExitReport) -> bool {
        match self.live.lock().unwrap().remove(&pid) {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }

    /// Children that have been spawned and not yet exited
    pub(crate) fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Spawn attempts, failed ones included
    pub(crate) fn spawn_calls(&self) -> usize {
        self.spawn_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn descriptors(&self) -> Vec<LaunchDescriptor> {
        self.descriptors.lock().unwrap().clone()
    }

    pub(crate) fn terminations(&self) -> Vec<(u32, TerminateSignal)> {
        self.terminations.lock().unwrap().clone()
    }

    /// Children keep running no matter which signal they get
    pub(crate) fn set_ignore_terminate(&self, ignore: bool) {
        self.ignore_terminate.store(ignore, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, descriptor: &LaunchDescriptor) -> io::Result<SpawnedProcess> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.live.lock().unwrap().insert(pid, tx);
        self.descriptors.lock().unwrap().push(descriptor.clone());

        Ok(SpawnedProcess {
            pid,
            exit: Box::pin(async move { rx.await.unwrap_or_default() }),
        })
    }

    fn terminate_tree(&self, pid: u32, signal: TerminateSignal) -> io::Result<()> {
        self.terminations.lock().unwrap().push((pid, signal));
        if self.ignore_terminate.load(Ordering::SeqCst) {
            return Ok(());
        }

        let signal = match signal {
            TerminateSignal::Graceful => SIGTERM,
            TerminateSignal::Force => SIGKILL,
        };
        self.exit(
            pid,
            ExitReport {
                code: None,
                signal: Some(signal),
            },
        );
        Ok(())
    }
}

/// Replays queued outcomes, then answers with the fallback forever
pub(crate) struct ScriptedProbe {
    queue: Mutex<VecDeque<ProbeOutcome>>,
    fallback: Mutex<ProbeOutcome>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub(crate) fn new(fallback: ProbeOutcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, outcome: ProbeOutcome) {
        self.queue.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn set_fallback(&self, outcome: ProbeOutcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}
