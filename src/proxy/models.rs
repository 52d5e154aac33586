//! Proxy data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
    /// SOCKS5 with host names resolved by the proxy
    Socks5h,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
            ProxyType::Socks5h => write!(f, "socks5h"),
        }
    }
}

impl ProxyType {
    /// Case-insensitive scheme lookup, `None` for unsupported schemes
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "http" => Some(ProxyType::Http),
            "https" => Some(ProxyType::Https),
            "socks4" => Some(ProxyType::Socks4),
            "socks5" => Some(ProxyType::Socks5),
            "socks5h" => Some(ProxyType::Socks5h),
            _ => None,
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// A parsed proxy line, before it becomes a pool address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl Proxy {
    /// Proxy without credentials
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: None,
        }
    }

    /// Proxy with username and password
    pub fn with_auth(
        host: String,
        port: u16,
        proxy_type: ProxyType,
        username: String,
        password: String,
    ) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: Some(ProxyAuth { username, password }),
        }
    }

    /// Address string as stored in the pool: `scheme://[user:pass@]host:port`
    pub fn address(&self) -> String {
        let auth_part = self.auth.as_ref().map_or(String::new(), |auth| {
            format!("{}:{}@", auth.username, auth.password)
        });

        format!("{}://{}{}:{}", self.proxy_type, auth_part, self.host, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

/// Per-proxy health record kept by the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEntry {
    pub address: String,
    pub success_count: u64,
    pub fail_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_fail: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl ProxyEntry {
    /// Fresh, active entry with zeroed counters
    pub fn new(address: String) -> Self {
        Self {
            address,
            success_count: 0,
            fail_count: 0,
            last_used: None,
            last_success: None,
            last_fail: None,
            is_active: true,
        }
    }
}

/// Snapshot returned by `ProxyPool::stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyPoolStats {
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    pub entries: Vec<ProxyEntry>,
}

/// The proxy picked for one outbound call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxySelection {
    pub address: String,
}

impl ProxySelection {
    /// Wrap a pool address
    pub fn new(address: String) -> Self {
        Self { address }
    }

    /// Scheme-keyed mapping handed to the transport: both plain and TLS
    /// traffic go through the same address
    pub fn as_map(&self) -> HashMap<&'static str, String> {
        HashMap::from([("http", self.address.clone()), ("https", self.address.clone())])
    }
}

impl fmt::Display for ProxySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Outcome of a single health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeStatus {
    Working,
    Failed(String),
    Timeout,
}

/// Detailed result of probing one proxy
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub address: String,
    pub status: ProbeStatus,
    pub response_time_ms: Option<u64>,
}

impl ProbeResult {
    /// Healthy result with its round-trip time
    pub fn working(address: String, response_time_ms: u64) -> Self {
        Self {
            address,
            status: ProbeStatus::Working,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// Unhealthy result with the error text
    pub fn failed(address: String, error: String) -> Self {
        Self {
            address,
            status: ProbeStatus::Failed(error),
            response_time_ms: None,
        }
    }

    /// Probe that did not finish in time
    pub fn timeout(address: String) -> Self {
        Self {
            address,
            status: ProbeStatus::Timeout,
            response_time_ms: None,
        }
    }

    /// Healthy probes only; timeouts count as failures
    pub fn is_working(&self) -> bool {
        matches!(self.status, ProbeStatus::Working)
    }
}
