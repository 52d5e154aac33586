//! Ctrip Spider - request optimization toolkit
//!
//! Disguises a sequence of scripted HTTP calls as organic traffic by rotating
//! client identities, routing through a health-tracked proxy pool and pacing
//! requests with randomized delays.

pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod optimizer;
pub mod proxy;
pub mod transport;

pub use config::{Config, DelayRange, OptimizerConfig, ProxyUsage, RotationMode};
pub use error::{OptimizerError, TransportError};
pub use identity::{IdentityPool, IdentityStats, DEFAULT_USER_AGENTS, IDENTITY_HEADER};
pub use optimizer::{OptimizerStats, RequestOptimizer};
pub use proxy::*;
pub use transport::{Headers, RequestBody, RequestOptions, Transport, TransportResponse};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
