use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::redirect::Policy;
use tracing::debug;

use super::types::ProbeResult;

/// Performs a single reachability check against an endpoint
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Probe `endpoint`, giving up after `timeout`.
    ///
    /// Never fails: an unreachable endpoint is reported as a down result.
    async fn check(&self, endpoint: &str, timeout: Duration) -> ProbeResult;
}

/// HTTP prober issuing `HEAD` requests
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> reqwest::Result<Self> {
        // Redirects are reported as observed instead of followed
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("uptime-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn check(&self, endpoint: &str, timeout: Duration) -> ProbeResult {
        let checked_at = Utc::now();
        let start = Instant::now();

        match self.client.head(endpoint).timeout(timeout).send().await {
            Ok(response) => {
                let elapsed = start.elapsed();
                ProbeResult::responded(endpoint, checked_at, response.status().as_u16(), elapsed)
            }
            Err(e) => {
                let reason = if e.is_timeout() { "timed out" } else { "request failed" };
                debug!(endpoint, error = %e, "Probe {}", reason);
                ProbeResult::unreachable(endpoint, checked_at)
            }
        }
    }
}
