//! Polling assertions for async tests
//!
//! Prefer these over fixed sleeps when a test waits on work happening in
//! other tasks or threads (blocking dialogs, child processes). Deadlines are
//! measured on the wall clock so they still hold under a paused tokio clock.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Retry `f` every `interval` until it returns `Ok`, panicking after `timeout`.
///
/// ```rust,ignore
/// let pid = assert_eventually(
///     "backend relaunch",
///     Duration::from_secs(3),
///     Duration::from_millis(100),
///     || async {
///         match supervisor.current_pid() {
///             Some(pid) if pid != crashed_pid => Ok(pid),
///             Some(_) => Err("old backend still tracked"),
///             None => Err("no backend running"),
///         }
///     },
/// )
/// .await;
/// ```
pub async fn assert_eventually<F, Fut, T, E>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return value,
            Err(e) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    panic!(
                        "Timeout waiting for {}\n\
                         Duration: {:?}\n\
                         Attempts: {}\n\
                         Last error: {}",
                        desc, elapsed, attempt, e
                    );
                }
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Boolean form of [`assert_eventually`]
pub async fn assert_eventually_bool<F, Fut>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    assert_eventually(desc, timeout, interval, || {
        let check = f();
        async move {
            if check.await {
                Ok(())
            } else {
                Err("condition never became true")
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_returns_value_after_retries() {
        let counter = Arc::new(AtomicUsize::new(0));

        let value = assert_eventually(
            "counter to reach 2",
            Duration::from_secs(2),
            Duration::from_millis(10),
            || {
                let counter = counter.clone();
                async move {
                    let seen = counter.fetch_add(1, Ordering::SeqCst);
                    if seen >= 2 {
                        Ok(seen)
                    } else {
                        Err(format!("counter at {}", seen))
                    }
                }
            },
        )
        .await;

        assert_eq!(value, 2);
    }

    #[tokio::test]
    #[should_panic(expected = "Timeout waiting for never true")]
    async fn test_bool_variant_times_out() {
        assert_eventually_bool(
            "never true",
            Duration::from_millis(100),
            Duration::from_millis(20),
            || async { false },
        )
        .await;
    }
}
