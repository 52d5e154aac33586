//! Optimizer and application configuration

use crate::error::OptimizerError;
use crate::logging::LogConfig;
use crate::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default lower delay bound in seconds
pub const DEFAULT_MIN_DELAY_SECS: f64 = 1.0;

/// Default upper delay bound in seconds
pub const DEFAULT_MAX_DELAY_SECS: f64 = 3.0;

/// Default URL used to probe proxy health
pub const DEFAULT_HEALTH_CHECK_URL: &str = "https://www.baidu.com";

/// Default timeout for a single proxy probe in milliseconds
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;

/// Default number of failures before a proxy is deactivated
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Default timeout for outbound requests in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default number of attempts made by `dispatch_with_retries`
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Selection policy shared by the identity and proxy pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    #[default]
    Random,
    RoundRobin,
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationMode::Random => write!(f, "random"),
            RotationMode::RoundRobin => write!(f, "round_robin"),
        }
    }
}

impl FromStr for RotationMode {
    type Err = OptimizerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(RotationMode::Random),
            "round_robin" | "roundrobin" => Ok(RotationMode::RoundRobin),
            _ => Err(OptimizerError::InvalidConfig(format!(
                "unknown rotation mode '{}', use: random, round_robin",
                s
            ))),
        }
    }
}

/// Inclusive bounds, in seconds, of the randomized pause before each request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_DELAY_SECS,
            max: DEFAULT_MAX_DELAY_SECS,
        }
    }
}

impl DelayRange {
    /// Build a validated range
    pub fn new(min: f64, max: f64) -> std::result::Result<Self, OptimizerError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Bounds must be finite, non-negative, ordered and representable as a `Duration`
    pub fn validate(&self) -> std::result::Result<(), OptimizerError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(OptimizerError::InvalidConfig(
                "delay bounds must be finite".to_string(),
            ));
        }
        if self.min < 0.0 {
            return Err(OptimizerError::InvalidConfig(format!(
                "delay lower bound {} is negative",
                self.min
            )));
        }
        if self.min > self.max {
            return Err(OptimizerError::InvalidConfig(format!(
                "delay lower bound {} exceeds upper bound {}",
                self.min, self.max
            )));
        }
        if Duration::try_from_secs_f64(self.max).is_err() {
            return Err(OptimizerError::InvalidConfig(format!(
                "delay upper bound {} is too large",
                self.max
            )));
        }
        Ok(())
    }

    /// Draw a uniform duration in `[min, max]`.
    ///
    /// An unvalidated range never panics: a non-increasing range yields `min`
    /// and an unrepresentable draw yields zero.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = if self.min < self.max {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// Immutable settings for one `RequestOptimizer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub delay: DelayRange,
    /// Overlay a pooled identity onto outbound headers
    pub rotate_identity: bool,
    /// Route requests through the proxy pool
    pub use_proxy: bool,
    pub rotation_mode: RotationMode,
    pub health_check_url: String,
    pub health_check_timeout_ms: u64,
    /// Failures before a proxy is deactivated during live traffic
    pub max_failures: u32,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            delay: DelayRange::default(),
            rotate_identity: true,
            use_proxy: false,
            rotation_mode: RotationMode::default(),
            health_check_url: DEFAULT_HEALTH_CHECK_URL.to_string(),
            health_check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
            max_failures: DEFAULT_MAX_FAILURES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause bounds in seconds
    pub fn with_delay(mut self, min: f64, max: f64) -> Self {
        self.delay = DelayRange { min, max };
        self
    }

    /// Turn identity overlay on or off
    pub fn with_identity_rotation(mut self, enabled: bool) -> Self {
        self.rotate_identity = enabled;
        self
    }

    /// Request routing through the proxy pool
    pub fn with_proxy(mut self, enabled: bool) -> Self {
        self.use_proxy = enabled;
        self
    }

    /// Selection policy for both pools
    pub fn with_rotation_mode(mut self, mode: RotationMode) -> Self {
        self.rotation_mode = mode;
        self
    }

    /// Target fetched by each health probe
    pub fn with_health_check_url(mut self, url: String) -> Self {
        self.health_check_url = url;
        self
    }

    /// Timeout for one health probe, kept at millisecond precision
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Failures that deactivate a proxy during live traffic
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Default timeout for outbound requests, kept at millisecond precision
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Attempts made by `dispatch_with_retries`
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Per-probe timeout of the health sweep
    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Timeout for calls that do not set their own
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject settings the optimizer cannot run with
    pub fn validate(&self) -> std::result::Result<(), OptimizerError> {
        self.delay.validate()?;
        if self.max_failures == 0 {
            return Err(OptimizerError::InvalidConfig(
                "max_failures must be at least 1".to_string(),
            ));
        }
        if self.health_check_timeout_ms == 0 {
            return Err(OptimizerError::InvalidConfig(
                "health_check_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(OptimizerError::InvalidConfig(
                "request_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Whether requests go through the proxy pool, resolved once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyUsage {
    Enabled,
    Disabled,
    /// Proxy use was requested but no proxy address was supplied
    Degraded,
}

impl ProxyUsage {
    /// Decide once whether the pool is used, degrading when it is empty
    pub fn resolve(requested: bool, proxy_count: usize) -> Self {
        match (requested, proxy_count) {
            (false, _) => ProxyUsage::Disabled,
            (true, 0) => ProxyUsage::Degraded,
            (true, _) => ProxyUsage::Enabled,
        }
    }

    /// True only when requests go through the pool
    pub fn is_enabled(&self) -> bool {
        matches!(self, ProxyUsage::Enabled)
    }
}

/// Top-level application configuration, usually read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub optimizer: OptimizerConfig,
    /// Custom identity strings; the built-in set is used when absent
    pub user_agents: Option<Vec<String>>,
    pub proxies: Vec<String>,
    /// File with one proxy per line, merged after `proxies`
    pub proxy_file: Option<PathBuf>,
    pub logging: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.optimizer.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
