use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY_MS: u64 = 20;
const MAX_DELAY_MS: u64 = 500;

/// Signal 0 probe. Zombies count as exited: an orphan may wait a while for
/// its reaper inside containers.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    if unsafe { libc::kill(pid as i32, 0) } != 0 {
        return false;
    }
    !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Format: "pid (comm) state ..."; comm may contain spaces
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let after_comm = stat.rsplit_once(')')?.1;
            after_comm.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    false
}

/// Wait for a process to disappear, used to check that no orphans remain.
pub fn wait_for_process_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);

    while is_process_running(pid) && start.elapsed() < timeout {
        let remaining = timeout.saturating_sub(start.elapsed());
        thread::sleep(delay.min(remaining));
        delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
    }

    !is_process_running(pid)
}

/// Kills a whole process group on drop so a failing test leaves nothing behind.
pub struct GroupGuard {
    pgid: u32,
}

impl GroupGuard {
    pub fn new(pgid: u32) -> Self {
        Self { pgid }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::kill(-(self.pgid as i32), libc::SIGKILL);
        }
    }
}
