//! Proxy module: pool bookkeeping, health probing and list parsing
//!
//! This module provides functionality for:
//! - Tracking per-proxy success/failure counters and active state
//! - Selecting proxies at random or least-loaded first
//! - Probing proxy health against a known-good URL
//! - Parsing proxy lists from various line formats

pub mod checker;
pub mod models;
pub mod parser;
pub mod pool;

pub use checker::{HealthProbe, ProxyChecker};
pub use models::{
    ProbeResult, ProbeStatus, Proxy, ProxyAuth, ProxyEntry, ProxyPoolStats, ProxySelection,
    ProxyType,
};
pub use parser::ProxyParser;
pub use pool::ProxyPool;
