use async_trait::async_trait;
use ctrip_spider::{
    Headers, IdentityPool, OptimizerConfig, ProxyPool, ProxySelection, ProxyUsage,
    RequestOptimizer, RequestOptions, RotationMode, Transport, TransportError, TransportResponse,
    IDENTITY_HEADER,
};
use ctrip_spider::transport::OutboundRequest;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const A: &str = "http://10.1.0.1:8080";
const B: &str = "http://10.1.0.2:8080";

/// Transport that succeeds and remembers which proxy each call used
#[derive(Default)]
struct RecordingTransport {
    proxies: parking_lot::Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.proxies
            .lock()
            .push(request.proxy.map(|p| p.address));
        Ok(TransportResponse {
            status: 200,
            headers: Headers::new(),
            body: String::new(),
        })
    }
}

#[test]
fn identity_round_robin_is_fair_and_cyclic() {
    let names = ["a", "b", "c", "d", "e"];
    let mut pool = IdentityPool::new(names);
    let n = 23;

    let sequence: Vec<String> = (0..n).map(|_| pool.select_round_robin().unwrap()).collect();
    for (i, identity) in sequence.iter().enumerate() {
        assert_eq!(identity, names[i % names.len()]);
    }

    let k = names.len();
    let stats = pool.stats();
    for count in stats.usage.values() {
        let count = *count as usize;
        assert!(count == n / k || count == n.div_ceil(k));
    }
}

#[test]
fn proxy_deactivation_and_reactivation_scenario() {
    let mut pool = ProxyPool::new([A, B]);
    for _ in 0..3 {
        pool.record_failure(A, 3);
    }
    assert!(!pool.entry(A).unwrap().is_active);

    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..100 {
        assert_ne!(pool.select_random(&mut rng).as_deref(), Some(A));
    }
    assert_eq!(pool.select_round_robin().as_deref(), Some(B));

    pool.record_success(A);
    let entry = pool.entry(A).unwrap();
    assert!(entry.is_active);
    assert_eq!(pool.stats().failed, 0);

    let picked: std::collections::HashSet<String> =
        (0..100).filter_map(|_| pool.select_random(&mut rng)).collect();
    assert!(picked.contains(A));
}

#[test]
fn round_robin_least_loaded_scenario() {
    let mut pool = ProxyPool::new([A, B]);
    (0..5).for_each(|_| pool.record_success(A));
    (0..2).for_each(|_| pool.record_success(B));

    assert_eq!(pool.select_round_robin().as_deref(), Some(B));
    (0..3).for_each(|_| pool.record_success(B));
    assert_eq!(pool.select_round_robin().as_deref(), Some(A));
}

#[tokio::test]
async fn degraded_optimizer_behaves_like_proxyless() {
    let config = OptimizerConfig::new().with_delay(0.0, 0.0);

    let degraded_transport = Arc::new(RecordingTransport::default());
    let degraded = RequestOptimizer::new(config.clone().with_proxy(true), None, vec![])
        .unwrap()
        .with_transport(degraded_transport.clone());

    let plain_transport = Arc::new(RecordingTransport::default());
    let plain = RequestOptimizer::new(config.with_proxy(false), None, vec![])
        .unwrap()
        .with_transport(plain_transport.clone());

    assert_eq!(degraded.proxy_usage(), ProxyUsage::Degraded);
    assert_eq!(plain.proxy_usage(), ProxyUsage::Disabled);

    for optimizer in [&degraded, &plain] {
        assert!(optimizer.proxy_selection().await.is_none());
        let response = optimizer
            .dispatch(Method::GET, "http://site", &Headers::new(), RequestOptions::new())
            .await;
        assert!(response.is_some());
    }
    assert_eq!(*degraded_transport.proxies.lock(), vec![None]);
    assert_eq!(*plain_transport.proxies.lock(), vec![None]);
}

#[tokio::test(start_paused = true)]
async fn delay_stays_within_bounds() {
    let optimizer = RequestOptimizer::new(
        OptimizerConfig::new().with_delay(0.5, 1.5),
        None,
        vec![],
    )
    .unwrap()
    .with_seed(77);

    for expected in 1..=50u64 {
        let pause = optimizer.delay().await;
        assert!(pause >= Duration::from_millis(500));
        assert!(pause <= Duration::from_millis(1500));
        assert_eq!(optimizer.request_count(), expected);
    }
}

#[tokio::test]
async fn shared_optimizer_keeps_counts_consistent() {
    let optimizer = Arc::new(
        RequestOptimizer::new(
            OptimizerConfig::new()
                .with_delay(0.0, 0.0)
                .with_proxy(true)
                .with_rotation_mode(RotationMode::RoundRobin),
            Some(vec!["ua-1".to_string(), "ua-2".to_string()]),
            vec![A.to_string(), B.to_string()],
        )
        .unwrap()
        .with_transport(Arc::new(RecordingTransport::default())),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let optimizer = Arc::clone(&optimizer);
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                optimizer
                    .dispatch(Method::GET, "http://site", &Headers::new(), RequestOptions::new())
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = optimizer.stats().await;
    assert_eq!(stats.request_count, 40);
    assert_eq!(stats.identities.usage.values().sum::<u64>(), 40);
    let successes: u64 = stats.proxies.entries.iter().map(|e| e.success_count).sum();
    assert_eq!(successes, 40);
}

#[tokio::test]
async fn manual_outcome_reporting() {
    let optimizer = RequestOptimizer::new(
        OptimizerConfig::new()
            .with_delay(0.0, 0.0)
            .with_proxy(true)
            .with_max_failures(2),
        Some(vec!["ua".to_string()]),
        vec![A.to_string()],
    )
    .unwrap();

    let headers = optimizer
        .headers(&HashMap::from([("Accept".to_string(), "*/*".to_string())]))
        .unwrap();
    assert_eq!(headers[IDENTITY_HEADER], "ua");

    let selection = optimizer.proxy_selection().await.unwrap();
    assert_eq!(selection, ProxySelection::new(A.to_string()));

    optimizer.report_failure(&selection).await;
    assert!(optimizer.proxy_selection().await.is_some());
    optimizer.report_failure(&selection).await;
    assert!(optimizer.proxy_selection().await.is_none());

    optimizer.report_success(&selection).await;
    assert!(optimizer.proxy_selection().await.is_some());
}
