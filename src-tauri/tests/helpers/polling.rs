use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY_MS: u64 = 20;
const MAX_DELAY_MS: u64 = 500;

/// Error returned when waiting for file content times out.
#[derive(Debug)]
pub struct WaitError {
    path: PathBuf,
    attempts: u32,
    waited: Duration,
    last_content: Option<String>,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {} attempts over {:?} waiting for {}. Last content: {}",
            self.attempts,
            self.waited,
            self.path.display(),
            self.last_content
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("<empty>"),
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll a file written by a child process until `predicate` accepts its content.
///
/// Backs off exponentially from 20ms, capped at 500ms between reads.
pub fn wait_for_file_content<P, F>(
    path: P,
    predicate: F,
    timeout: Duration,
) -> Result<String, WaitError>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let path = path.as_ref();
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    let mut attempts = 0;
    let mut last_content = None;

    loop {
        attempts += 1;
        match fs::read_to_string(path) {
            Ok(content) if predicate(&content) => return Ok(content),
            Ok(content) => last_content = Some(content),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => last_content = Some(format!("<unreadable: {}>", err)),
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(WaitError {
                path: path.to_path_buf(),
                attempts,
                waited: start.elapsed(),
                last_content,
            });
        }

        thread::sleep(delay.min(remaining));
        delay = (delay * 2).min(Duration::from_millis(MAX_DELAY_MS));
    }
}

/// Read a pid a child script wrote to `path`
pub fn wait_for_pid_file(path: &Path, timeout: Duration) -> Result<u32, WaitError> {
    let content = wait_for_file_content(
        path,
        |content| content.trim().parse::<u32>().is_ok(),
        timeout,
    )?;
    Ok(content.trim().parse().unwrap_or_default())
}

/// Async counterpart for conditions that change on tokio tasks.
/// Returns whether `condition` held before `timeout`.
pub async fn poll_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(INITIAL_DELAY_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn wait_for_file_content_returns_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("child.pid");
        fs::write(&file, "4242\n").unwrap();

        assert_eq!(wait_for_pid_file(&file, Duration::from_secs(1)).unwrap(), 4242);
    }

    #[test]
    fn wait_for_file_content_times_out_with_context() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("missing.pid");

        let err = wait_for_pid_file(&file, Duration::from_millis(1)).expect_err("should time out");
        assert!(err.to_string().contains("missing.pid"));
    }
}
