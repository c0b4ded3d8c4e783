// Backend process launching
// Two launch variants: a shell command line with inherited output (development),
// and a direct interpreter + script invocation with piped output (packaged
// builds). Both run as their own process group.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::terminate::{terminate_tree, TerminateSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Command line run through the platform shell, output inherited
    Shell,
    /// Program + arguments run directly, output piped into the log
    Script,
}

/// Everything needed to (re)start the backend the same way every time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchDescriptor {
    pub mode: LaunchMode,
    /// Program to execute, or the full command line in `Shell` mode
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl LaunchDescriptor {
    pub fn shell(command_line: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            mode: LaunchMode::Shell,
            program: command_line.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn script<I, S>(program: impl Into<String>, args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: LaunchMode::Script,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable command for logs
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How a backend process ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

pub type ExitFuture = Pin<Box<dyn Future<Output = ExitReport> + Send>>;

/// A freshly spawned child: its pid and a future resolving when it exits
pub struct SpawnedProcess {
    pub pid: u32,
    pub exit: ExitFuture,
}

/// OS seam for the supervisor. Spawning must be called from within a tokio runtime.
pub trait ProcessBackend: Send + Sync + 'static {
    fn spawn(&self, descriptor: &LaunchDescriptor) -> io::Result<SpawnedProcess>;
    fn terminate_tree(&self, pid: u32, signal: TerminateSignal) -> io::Result<()>;
}

/// Real child processes via `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessBackend;

impl ProcessBackend for OsProcessBackend {
    fn spawn(&self, descriptor: &LaunchDescriptor) -> io::Result<SpawnedProcess> {
        debug!("Spawning backend: {}", descriptor.command_line());
        let mut child = build_command(descriptor).spawn()?;
        let pid = child.id().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "backend exited before its pid was read")
        })?;

        if descriptor.mode == LaunchMode::Script {
            spawn_log_forwarder(child.stdout.take(), pid, "stdout");
            spawn_log_forwarder(child.stderr.take(), pid, "stderr");
        }

        let exit: ExitFuture = Box::pin(async move {
            match child.wait().await {
                Ok(status) => ExitReport::from(status),
                Err(e) => {
                    warn!("Failed waiting on backend pid {}: {}", pid, e);
                    ExitReport::default()
                }
            }
        });

        Ok(SpawnedProcess { pid, exit })
    }

    fn terminate_tree(&self, pid: u32, signal: TerminateSignal) -> io::Result<()> {
        terminate_tree(pid, signal)
    }
}

fn build_command(descriptor: &LaunchDescriptor) -> Command {
    let mut cmd = match descriptor.mode {
        LaunchMode::Shell => shell_command(&descriptor.command_line()),
        LaunchMode::Script => {
            let mut cmd = Command::new(&descriptor.program);
            cmd.args(&descriptor.args);
            cmd
        }
    };

    cmd.current_dir(&descriptor.cwd).envs(&descriptor.env);

    match descriptor.mode {
        LaunchMode::Shell => {
            // A background process group reading the terminal would be stopped by SIGTTIN
            cmd.stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
        LaunchMode::Script => {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }
    }

    // Own process group so the whole tree can be signalled at once: dev
    // commands like `npm run serve` leave the server as a grandchild
    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        let flags = match descriptor.mode {
            LaunchMode::Shell => CREATE_NEW_PROCESS_GROUP,
            LaunchMode::Script => CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP,
        };
        cmd.creation_flags(flags);
    }

    cmd
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

/// Re-emit backend output under the `backend` target so it lands in desktop.log.
/// Draining also keeps the child from blocking on a full pipe.
fn spawn_log_forwarder<R>(stream: Option<R>, pid: u32, stream_name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut read_errors = 0u32;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    read_errors = 0;
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    info!(target: "backend", pid, stream = stream_name, "{}", line);
                }
                // Keep the pipe open: a closed read end turns the child's next write into SIGPIPE
                Err(e) if read_errors < MAX_CONSECUTIVE_READ_ERRORS => {
                    read_errors += 1;
                    warn!("Reading backend {} (pid {}) failed: {}", stream_name, pid, e);
                }
                Err(e) => {
                    warn!("Giving up on backend {} (pid {}): {}", stream_name, pid, e);
                    break;
                }
            }
        }
    });
}

const MAX_CONSECUTIVE_READ_ERRORS: u32 = 8;
