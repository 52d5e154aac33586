//! Error types for the optimizer core and the transport layer

use thiserror::Error;

/// Errors raised by the identity/proxy pools and optimizer construction
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Selection was attempted on a pool with no identities
    #[error("identity pool is empty")]
    EmptyPool,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid proxy address '{address}': {reason}")]
    InvalidProxy { address: String, reason: String },
}

/// Errors produced while performing an outbound call
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("proxy '{address}' rejected: {reason}")]
    InvalidProxy { address: String, reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether the failure is attributable to the upstream proxy hop
    pub fn is_proxy_related(&self) -> bool {
        match self {
            TransportError::InvalidProxy { .. } => true,
            TransportError::Timeout => true,
            TransportError::Request(e) => e.is_connect() || e.is_timeout(),
        }
    }
}
