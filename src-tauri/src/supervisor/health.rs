// Backend liveness probing
// A probe distinguishes "answered with an error" from "did not answer at all";
// only the latter counts against the backend's liveness.

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Answered with a non-5xx status
    Healthy(u16),
    /// Answered, but with a 5xx status
    Unhealthy(u16),
    /// Timed out, refused, or failed before any response
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::Unhealthy(status)
        } else {
            Self::Healthy(status)
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Probe `url`, giving up after `timeout`. Must never hang past it.
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// `HEAD` requests over loopback HTTP
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        // The backend lives on loopback; never route probes through a proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        // Dropping the request future on timeout aborts the in-flight probe
        match tokio::time::timeout(timeout, self.client.head(url).send()).await {
            Ok(Ok(response)) => ProbeOutcome::from_status(response.status().as_u16()),
            Ok(Err(e)) => ProbeOutcome::Unreachable(e.to_string()),
            Err(_) => ProbeOutcome::Unreachable(format!("no response within {:?}", timeout)),
        }
    }
}
