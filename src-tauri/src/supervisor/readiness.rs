// Boot-time readiness gate

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::health::HealthProbe;

/// Upper bound for a single readiness probe
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `url` every `interval` until it answers with a non-5xx status.
///
/// Returns `false` once `timeout` has elapsed without a successful probe.
pub async fn wait_for_ready(
    probe: &dyn HealthProbe,
    url: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = probe
            .probe(url, remaining.min(READY_PROBE_TIMEOUT).max(Duration::from_millis(1)))
            .await;

        if outcome.is_ready() {
            info!(
                "Backend ready at {} after {:?} ({} probes)",
                url,
                started.elapsed(),
                attempts
            );
            return true;
        }
        debug!("Readiness probe {} for {}: {:?}", attempts, url, outcome);

        let now = Instant::now();
        if now >= deadline {
            warn!(
                "Backend at {} not ready after {:?} ({} probes)",
                url, timeout, attempts
            );
            return false;
        }
        sleep(interval.min(deadline - now)).await;
    }
}
