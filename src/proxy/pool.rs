//! Proxy pool with per-proxy health counters.
//!
//! Entries keep their insertion order. A proxy is deactivated once its
//! failure count reaches the threshold supplied with the failure report, and
//! is reactivated by the next success.

use crate::proxy::checker::{HealthProbe, ProxyChecker};
use crate::proxy::models::{ProbeResult, ProxyEntry, ProxyPoolStats};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for a single health probe
const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 5;

/// Threshold used by the health sweep: one failed probe deactivates
const SWEEP_FAILURE_THRESHOLD: u32 = 1;

/// Ordered proxy entries plus the set of addresses marked failed
pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    failed: HashSet<String>,
    probe: Arc<dyn HealthProbe>,
    check_timeout: Duration,
}

impl ProxyPool {
    /// Create a pool probing through [`ProxyChecker`]
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool = Self {
            entries: Vec::new(),
            failed: HashSet::new(),
            probe: Arc::new(ProxyChecker::new()),
            check_timeout: Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECS),
        };
        for address in addresses {
            pool.add(address);
        }
        pool
    }

    /// Replace the health probe
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Timeout applied to each probe of `check_all`
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// Current per-probe timeout of `check_all`
    pub fn check_timeout(&self) -> Duration {
        self.check_timeout
    }

    /// Number of proxies, active or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no proxy was added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses in insertion order
    pub fn addresses(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.address.clone()).collect()
    }

    /// Health record for `address`, if present
    pub fn entry(&self, address: &str) -> Option<&ProxyEntry> {
        self.entries.iter().find(|e| e.address == address)
    }

    fn entry_mut(&mut self, address: &str) -> Option<&mut ProxyEntry> {
        self.entries.iter_mut().find(|e| e.address == address)
    }

    /// Insert a new active entry; known addresses are ignored
    pub fn add<S: Into<String>>(&mut self, address: S) {
        let address = address.into();
        if self.entry(&address).is_some() {
            return;
        }
        info!(proxy = %address, "Added proxy");
        self.entries.push(ProxyEntry::new(address));
    }

    /// Drop the entry, its counters and any failed marker
    pub fn remove(&mut self, address: &str) {
        let before = self.entries.len();
        self.entries.retain(|e| e.address != address);
        self.failed.remove(address);
        if self.entries.len() != before {
            info!(proxy = %address, "Removed proxy");
        }
    }

    /// Probe one proxy without touching its recorded state
    pub async fn check(&self, address: &str, probe_url: &str, timeout: Duration) -> ProbeResult {
        self.probe.probe(address, probe_url, timeout).await
    }

    /// Probe every proxy in turn and fold each result into its counters.
    ///
    /// Runs sequentially; a single failed probe deactivates the proxy.
    pub async fn check_all(&mut self, probe_url: &str) -> Vec<ProbeResult> {
        let addresses = self.addresses();
        info!(count = addresses.len(), url = %probe_url, "Checking proxy health");

        let mut results = Vec::with_capacity(addresses.len());
        for address in addresses {
            let result = self.check(&address, probe_url, self.check_timeout).await;
            if result.is_working() {
                self.record_success(&address);
            } else {
                self.record_failure(&address, SWEEP_FAILURE_THRESHOLD);
            }
            results.push(result);
        }

        info!(
            active = self.active_count(),
            total = self.entries.len(),
            "Proxy health check finished"
        );
        results
    }

    fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active).count()
    }

    fn mark_used(&mut self, index: usize) -> String {
        let entry = &mut self.entries[index];
        entry.last_used = Some(Utc::now());
        entry.address.clone()
    }

    /// Uniformly random choice among active proxies
    pub fn select_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let active: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_active)
            .map(|(i, _)| i)
            .collect();

        if active.is_empty() {
            warn!("No active proxy available");
            return None;
        }
        let index = active[rng.random_range(0..active.len())];
        Some(self.mark_used(index))
    }

    /// Least-loaded choice: the active proxy with the fewest successes.
    ///
    /// Despite the name this is not a rotating pointer; ties go to the proxy
    /// added first.
    pub fn select_round_robin(&mut self) -> Option<String> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_active)
            .min_by_key(|(_, e)| e.success_count)
            .map(|(i, _)| i);

        match index {
            Some(index) => Some(self.mark_used(index)),
            None => {
                warn!("No active proxy available");
                None
            }
        }
    }

    /// Count a success, reactivate the proxy and reset its failure streak
    pub fn record_success(&mut self, address: &str) {
        let Some(entry) = self.entry_mut(address) else {
            return;
        };
        entry.success_count += 1;
        entry.fail_count = 0;
        entry.last_success = Some(Utc::now());
        let reactivated = !entry.is_active;
        entry.is_active = true;
        self.failed.remove(address);

        if reactivated {
            info!(proxy = %address, "Proxy reactivated");
        } else {
            debug!(proxy = %address, "Proxy success recorded");
        }
    }

    /// Count a failure; deactivate once `fail_count` reaches `threshold`
    pub fn record_failure(&mut self, address: &str, threshold: u32) {
        let Some(entry) = self.entry_mut(address) else {
            return;
        };
        entry.fail_count += 1;
        entry.last_fail = Some(Utc::now());

        if entry.fail_count >= u64::from(threshold) {
            let newly_inactive = entry.is_active;
            entry.is_active = false;
            let fail_count = entry.fail_count;
            self.failed.insert(address.to_string());
            if newly_inactive {
                warn!(proxy = %address, fail_count, "Proxy failed too often, marked inactive");
            }
        } else {
            debug!(proxy = %address, fail_count = entry.fail_count, "Proxy failure recorded");
        }
    }

    /// Totals plus a copy of every entry
    pub fn stats(&self) -> ProxyPoolStats {
        ProxyPoolStats {
            total: self.entries.len(),
            active: self.active_count(),
            failed: self.failed.len(),
            entries: self.entries.clone(),
        }
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProbeStatus;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    const A: &str = "http://10.0.0.1:8080";
    const B: &str = "http://10.0.0.2:8080";
    const C: &str = "http://10.0.0.3:8080";

    /// Probe answering from a fixed table; unknown addresses fail
    struct StaticProbe {
        healthy: HashMap<String, bool>,
    }

    impl StaticProbe {
        fn new(healthy: &[(&str, bool)]) -> Arc<Self> {
            Arc::new(Self {
                healthy: healthy.iter().map(|(a, h)| (a.to_string(), *h)).collect(),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        async fn probe(&self, address: &str, _url: &str, _timeout: Duration) -> ProbeResult {
            if self.healthy.get(address).copied().unwrap_or(false) {
                ProbeResult::working(address.to_string(), 1)
            } else {
                ProbeResult::failed(address.to_string(), "refused".to_string())
            }
        }
    }

    #[test]
    fn test_add_deduplicates() {
        let mut pool = ProxyPool::new([A, B]);
        pool.add(A);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.addresses(), vec![A.to_string(), B.to_string()]);
    }

    #[test]
    fn test_remove_clears_state() {
        let mut pool = ProxyPool::new([A, B]);
        pool.record_failure(A, 1);
        assert_eq!(pool.stats().failed, 1);

        pool.remove(A);
        assert_eq!(pool.len(), 1);
        assert!(pool.entry(A).is_none());
        assert_eq!(pool.stats().failed, 0);

        // removing an absent proxy is a no-op
        pool.remove("http://nowhere:1");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_deactivation_at_threshold() {
        let mut pool = ProxyPool::new([A, B]);
        pool.record_failure(A, 3);
        pool.record_failure(A, 3);
        assert!(pool.entry(A).unwrap().is_active);

        pool.record_failure(A, 3);
        let entry = pool.entry(A).unwrap();
        assert!(!entry.is_active);
        assert_eq!(entry.fail_count, 3);
        assert!(entry.last_fail.is_some());

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(pool.select_random(&mut rng).as_deref(), Some(B));
        }
        assert_eq!(pool.select_round_robin().as_deref(), Some(B));
    }

    #[test]
    fn test_success_reactivates_and_resets_failures() {
        let mut pool = ProxyPool::new([A]);
        pool.record_failure(A, 2);
        pool.record_failure(A, 2);
        assert!(!pool.entry(A).unwrap().is_active);
        assert_eq!(pool.stats().failed, 1);

        pool.record_success(A);
        let entry = pool.entry(A).unwrap();
        assert!(entry.is_active);
        assert_eq!(entry.fail_count, 0);
        assert_eq!(entry.success_count, 1);
        assert!(entry.last_success.is_some());
        assert_eq!(pool.stats().failed, 0);
    }

    #[test]
    fn test_flapping_proxy_needs_full_streak_to_deactivate() {
        let mut pool = ProxyPool::new([A]);
        for _ in 0..3 {
            pool.record_failure(A, 3);
            pool.record_failure(A, 3);
            pool.record_success(A);
        }
        pool.record_failure(A, 3);
        assert!(pool.entry(A).unwrap().is_active);
    }

    #[test]
    fn test_unknown_address_is_ignored() {
        let mut pool = ProxyPool::new([A]);
        pool.record_success("http://ghost:1");
        pool.record_failure("http://ghost:1", 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().failed, 0);
    }

    #[test]
    fn test_selection_empty_pool() {
        let mut pool = ProxyPool::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(pool.select_random(&mut rng).is_none());
        assert!(pool.select_round_robin().is_none());
    }

    #[test]
    fn test_selection_all_inactive() {
        let mut pool = ProxyPool::new([A, B]);
        pool.record_failure(A, 1);
        pool.record_failure(B, 1);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(pool.select_random(&mut rng).is_none());
        assert!(pool.select_round_robin().is_none());
    }

    #[test]
    fn test_select_records_last_used() {
        let mut pool = ProxyPool::new([A]);
        assert!(pool.entry(A).unwrap().last_used.is_none());
        pool.select_round_robin();
        assert!(pool.entry(A).unwrap().last_used.is_some());
    }

    #[test]
    fn test_random_covers_active_set() {
        let mut pool = ProxyPool::new([A, B, C]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.select_random(&mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_round_robin_is_least_loaded() {
        let mut pool = ProxyPool::new([A, B]);
        for _ in 0..5 {
            pool.record_success(A);
        }
        for _ in 0..2 {
            pool.record_success(B);
        }
        assert_eq!(pool.select_round_robin().as_deref(), Some(B));

        for _ in 0..3 {
            pool.record_success(B);
        }
        // 5 vs 5: insertion order breaks the tie
        assert_eq!(pool.select_round_robin().as_deref(), Some(A));
    }

    #[test]
    fn test_stats_snapshot() {
        let mut pool = ProxyPool::new([A, B, C]);
        pool.record_failure(C, 1);
        pool.record_success(A);

        let stats = pool.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.entries.len(), 3);
        assert_eq!(stats.entries[0].address, A);
        assert_eq!(stats.entries[0].success_count, 1);
    }

    #[tokio::test]
    async fn test_check_does_not_mutate() {
        let pool = ProxyPool::new([A]).with_probe(StaticProbe::new(&[(A, false)]));
        let result = pool.check(A, "http://probe", Duration::from_secs(1)).await;
        assert!(!result.is_working());
        let entry = pool.entry(A).unwrap();
        assert!(entry.is_active);
        assert_eq!(entry.fail_count, 0);
    }

    #[tokio::test]
    async fn test_check_all_folds_results() {
        let mut pool = ProxyPool::new([A, B, C])
            .with_probe(StaticProbe::new(&[(A, true), (B, false), (C, true)]));

        let results = pool.check_all("http://probe").await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].status, ProbeStatus::Failed("refused".to_string()));

        let stats = pool.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.failed, 1);
        assert!(!pool.entry(B).unwrap().is_active);
        assert_eq!(pool.entry(A).unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_check_all_revives_recovered_proxy() {
        let mut pool = ProxyPool::new([A]).with_probe(StaticProbe::new(&[(A, true)]));
        pool.record_failure(A, 1);
        assert!(!pool.entry(A).unwrap().is_active);

        pool.check_all("http://probe").await;
        assert!(pool.entry(A).unwrap().is_active);
        assert_eq!(pool.stats().failed, 0);
    }
}
