//! Request optimizer: one facade combining identity rotation, proxy
//! selection and randomized pacing around every outbound call.
//!
//! Each optimizer owns its pools. Every pool sits behind a single lock so the
//! optimizer can be shared between tasks through an `Arc` while keeping the
//! proxy counters and their derived active flag consistent.

use crate::config::{OptimizerConfig, ProxyUsage, RotationMode};
use crate::error::OptimizerError;
use crate::identity::{IdentityPool, IdentityStats, IDENTITY_HEADER};
use crate::proxy::{ProbeResult, ProxyPool, ProxyPoolStats, ProxySelection};
use crate::transport::{
    Headers, OutboundRequest, ReqwestTransport, RequestOptions, Transport, TransportResponse,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Method;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Aggregated counters returned by [`RequestOptimizer::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStats {
    pub request_count: u64,
    pub proxy_usage: ProxyUsage,
    pub identities: IdentityStats,
    pub proxies: ProxyPoolStats,
}

/// Facade over the identity pool, the proxy pool and request pacing
pub struct RequestOptimizer {
    config: OptimizerConfig,
    proxy_usage: ProxyUsage,
    identities: parking_lot::Mutex<IdentityPool>,
    proxies: tokio::sync::Mutex<ProxyPool>,
    rng: parking_lot::Mutex<StdRng>,
    transport: Arc<dyn Transport>,
    request_count: AtomicU64,
}

impl RequestOptimizer {
    /// Build an optimizer with its own pools.
    ///
    /// `identities` of `None` selects the built-in browser signatures. Asking
    /// for proxies without supplying any does not fail: proxy use is disabled
    /// and the optimizer reports [`ProxyUsage::Degraded`].
    pub fn new(
        config: OptimizerConfig,
        identities: Option<Vec<String>>,
        proxies: Vec<String>,
    ) -> Result<Self, OptimizerError> {
        let identity_pool = match identities {
            Some(list) => IdentityPool::new(list),
            None => IdentityPool::with_defaults(),
        };
        Self::from_pools(config, identity_pool, ProxyPool::new(proxies))
    }

    /// Build an optimizer around caller-supplied pools.
    ///
    /// The pool's probe timeout is replaced by the configured one.
    pub fn from_pools(
        config: OptimizerConfig,
        identities: IdentityPool,
        proxies: ProxyPool,
    ) -> Result<Self, OptimizerError> {
        config.validate()?;
        let transport = ReqwestTransport::new().map_err(|e| {
            OptimizerError::InvalidConfig(format!("failed to build HTTP client: {}", e))
        })?;
        let proxies = proxies.with_check_timeout(config.health_check_timeout());

        let proxy_usage = ProxyUsage::resolve(config.use_proxy, proxies.len());
        if proxy_usage == ProxyUsage::Degraded {
            warn!("Proxy use requested but no proxies supplied, continuing without proxies");
        }

        debug!(
            identities = identities.len(),
            proxies = proxies.len(),
            mode = %config.rotation_mode,
            ?proxy_usage,
            "Request optimizer ready"
        );

        Ok(Self {
            config,
            proxy_usage,
            identities: parking_lot::Mutex::new(identities),
            proxies: tokio::sync::Mutex::new(proxies),
            rng: parking_lot::Mutex::new(StdRng::from_os_rng()),
            transport: Arc::new(transport),
            request_count: AtomicU64::new(0),
        })
    }

    /// Swap the HTTP transport, e.g. for a scripted one in tests
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the random source with a seeded one for reproducible runs
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Settings fixed at construction
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Proxy routing mode resolved at construction
    pub fn proxy_usage(&self) -> ProxyUsage {
        self.proxy_usage
    }

    /// Number of paced requests so far
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Copy `base` and overlay a pooled identity when rotation is on
    pub fn headers(&self, base: &Headers) -> Result<Headers, OptimizerError> {
        let mut headers = base.clone();
        if !self.config.rotate_identity {
            return Ok(headers);
        }

        let identity = {
            let mut pool = self.identities.lock();
            match self.config.rotation_mode {
                RotationMode::Random => pool.select_random(&mut *self.rng.lock())?,
                RotationMode::RoundRobin => pool.select_round_robin()?,
            }
        };
        debug!(user_agent = %truncate(&identity, 50), "Using identity");
        headers.insert(IDENTITY_HEADER.to_string(), identity);
        Ok(headers)
    }

    /// Pick a proxy for the next call, or `None` when proxies are off or
    /// none is active
    pub async fn proxy_selection(&self) -> Option<ProxySelection> {
        if !self.proxy_usage.is_enabled() {
            return None;
        }

        let mut pool = self.proxies.lock().await;
        let address = match self.config.rotation_mode {
            RotationMode::Random => pool.select_random(&mut *self.rng.lock()),
            RotationMode::RoundRobin => pool.select_round_robin(),
        };
        match address {
            Some(address) => {
                debug!(proxy = %address, "Using proxy");
                Some(ProxySelection::new(address))
            }
            None => {
                warn!("No usable proxy, sending directly");
                None
            }
        }
    }

    /// Sleep for a random duration within the configured bounds.
    ///
    /// Always counts one request, whatever happens afterwards.
    pub async fn delay(&self) -> Duration {
        let pause = self.config.delay.sample(&mut *self.rng.lock());
        let count = self.request_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(delay_secs = pause.as_secs_f64(), request = count, "Pacing request");
        tokio::time::sleep(pause).await;
        pause
    }

    /// Record a successful call through `selection`
    pub async fn report_success(&self, selection: &ProxySelection) {
        self.proxies.lock().await.record_success(&selection.address);
    }

    /// Record a failed call; deactivates after `max_failures` in a row
    pub async fn report_failure(&self, selection: &ProxySelection) {
        self.proxies
            .lock()
            .await
            .record_failure(&selection.address, self.config.max_failures);
    }

    /// Pace, rotate, pick a proxy, send one request and record the outcome.
    ///
    /// Failures never escape: a transport error or a non-2xx status is
    /// charged to the proxy used (if any) and yields `None`.
    pub async fn dispatch(
        &self,
        method: Method,
        url: &str,
        base_headers: &Headers,
        options: RequestOptions,
    ) -> Option<TransportResponse> {
        self.delay().await;

        let headers = match self.headers(base_headers) {
            Ok(headers) => headers,
            Err(e) => {
                error!(url, error = %e, "Could not prepare request headers");
                return None;
            }
        };
        let proxy = self.proxy_selection().await;

        let request = OutboundRequest {
            method: method.clone(),
            url: url.to_string(),
            headers,
            proxy: proxy.clone(),
            body: options.body,
            query: options.query,
            timeout: options.timeout.unwrap_or_else(|| self.config.request_timeout()),
        };

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                if let Some(proxy) = &proxy {
                    self.report_success(proxy).await;
                }
                debug!(%method, url, status = response.status, "Request succeeded");
                Some(response)
            }
            Ok(response) => {
                warn!(%method, url, status = response.status, "Request rejected");
                if let Some(proxy) = &proxy {
                    self.report_failure(proxy).await;
                }
                None
            }
            Err(e) => {
                if e.is_proxy_related() && proxy.is_some() {
                    error!(%method, url, error = %e, "Proxy error");
                } else {
                    error!(%method, url, error = %e, "Request error");
                }
                if let Some(proxy) = &proxy {
                    self.report_failure(proxy).await;
                }
                None
            }
        }
    }

    /// Run [`dispatch`](Self::dispatch) up to `max_retries` times, each
    /// attempt with fresh pacing, identity and proxy
    pub async fn dispatch_with_retries(
        &self,
        method: Method,
        url: &str,
        base_headers: &Headers,
        options: RequestOptions,
    ) -> Option<TransportResponse> {
        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            if let Some(response) = self
                .dispatch(method.clone(), url, base_headers, options.clone())
                .await
            {
                return Some(response);
            }
            if attempt < attempts {
                info!(url, attempt, attempts, "Retrying request");
            }
        }
        warn!(url, attempts, "Giving up on request");
        None
    }

    /// Sweep every proxy against `probe_url` (or the configured target)
    pub async fn check_proxies(&self, probe_url: Option<&str>) -> Vec<ProbeResult> {
        let url = probe_url.unwrap_or(&self.config.health_check_url);
        self.proxies.lock().await.check_all(url).await
    }

    /// Drop a proxy from the pool and release its cached client
    pub async fn remove_proxy(&self, address: &str) {
        self.proxies.lock().await.remove(address);
        self.transport.release_proxy(address);
    }

    /// Snapshot of request, identity and proxy counters
    pub async fn stats(&self) -> OptimizerStats {
        let identities = self.identities.lock().stats();
        let proxies = self.proxies.lock().await.stats();
        OptimizerStats {
            request_count: self.request_count(),
            proxy_usage: self.proxy_usage,
            identities,
            proxies,
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}
