//! Proxy health probing

use crate::proxy::models::ProbeResult;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sends one request through a proxy and reports how it went.
///
/// Probing never mutates pool state; callers decide what to record.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, address: &str, probe_url: &str, timeout: Duration) -> ProbeResult;
}

/// `reqwest`-backed probe: `GET probe_url` through the proxy, healthy on 2xx
#[derive(Debug, Clone, Default)]
pub struct ProxyChecker;

impl ProxyChecker {
    /// Create a probe; a fresh client is built per proxy
    pub fn new() -> Self {
        Self
    }

    fn create_client(address: &str, timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .proxy(ReqwestProxy::all(address)?)
            .timeout(timeout)
            .build()
    }
}

#[async_trait]
impl HealthProbe for ProxyChecker {
    async fn probe(&self, address: &str, probe_url: &str, timeout: Duration) -> ProbeResult {
        let start = Instant::now();

        let client = match Self::create_client(address, timeout) {
            Ok(client) => client,
            Err(e) => return ProbeResult::failed(address.to_string(), e.to_string()),
        };

        let result = match tokio::time::timeout(timeout, client.get(probe_url).send()).await {
            Ok(Ok(response)) if response.status().is_success() => {
                ProbeResult::working(address.to_string(), start.elapsed().as_millis() as u64)
            }
            Ok(Ok(response)) => ProbeResult::failed(
                address.to_string(),
                format!("HTTP status: {}", response.status()),
            ),
            Ok(Err(e)) if e.is_timeout() => ProbeResult::timeout(address.to_string()),
            Ok(Err(e)) => ProbeResult::failed(address.to_string(), e.to_string()),
            Err(_) => ProbeResult::timeout(address.to_string()),
        };

        debug!(proxy = %address, status = ?result.status, "Probe finished");
        result
    }
}
