// Process-tree termination
// POSIX signals the child's process group and falls back to the bare pid;
// Windows has no process groups we can signal, so `taskkill /T` walks the tree.

use std::io;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateSignal {
    /// SIGTERM / `taskkill /T`
    Graceful,
    /// SIGKILL / `taskkill /T /F`
    Force,
}

fn checked_pid(pid: u32) -> io::Result<i32> {
    // 0 and 1 would address our own group or every process we can signal
    match i32::try_from(pid) {
        Ok(pid) if pid > 1 => Ok(pid),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {}", pid),
        )),
    }
}

#[cfg(unix)]
pub fn terminate_tree(pid: u32, signal: TerminateSignal) -> io::Result<()> {
    let pid = checked_pid(pid)?;
    let sig = match signal {
        TerminateSignal::Graceful => libc::SIGTERM,
        TerminateSignal::Force => libc::SIGKILL,
    };

    // SAFETY: kill() has no memory-safety preconditions
    if unsafe { libc::kill(-pid, sig) } == 0 {
        return Ok(());
    }
    debug!(
        "Group kill of {} failed ({}), signalling pid directly",
        pid,
        io::Error::last_os_error()
    );

    // SAFETY: as above
    if unsafe { libc::kill(pid, sig) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
pub fn terminate_tree(pid: u32, signal: TerminateSignal) -> io::Result<()> {
    use std::os::windows::process::CommandExt;
    use std::process::{Command, Stdio};

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    checked_pid(pid)?;
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if signal == TerminateSignal::Force {
        cmd.arg("/F");
    }
    let status = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()?;

    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("taskkill exited with {}", status),
        ))
    }
}
