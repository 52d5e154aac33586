//! Client identity (User-Agent) pool with random and cyclic selection

use crate::error::OptimizerError;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

/// Header field that carries the rotated identity
pub const IDENTITY_HEADER: &str = "User-Agent";

/// Built-in browser signatures used when no custom list is supplied
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:119.0) Gecko/20100101 Firefox/119.0",
    // Firefox on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    // Chrome on Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Mobile
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
];

#[derive(Debug, Clone)]
struct Identity {
    value: String,
    usage: u64,
}

/// Usage snapshot returned by [`IdentityPool::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityStats {
    pub total: usize,
    pub usage: HashMap<String, u64>,
}

/// Ordered, deduplicated set of identity strings.
///
/// Identities are never removed; the set is meant to stay fixed for a run.
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    identities: Vec<Identity>,
    cursor: usize,
}

impl IdentityPool {
    /// Build a pool from exactly the given identities, dropping duplicates
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool = Self::default();
        for identity in identities {
            pool.add(identity);
        }
        pool
    }

    /// Build a pool from [`DEFAULT_USER_AGENTS`]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_USER_AGENTS.iter().copied())
    }

    /// Insert an identity unless an identical string is already present
    pub fn add<S: Into<String>>(&mut self, identity: S) {
        let value = identity.into();
        if self.identities.iter().any(|i| i.value == value) {
            return;
        }
        self.identities.push(Identity { value, usage: 0 });
    }

    /// Number of distinct identities
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// True when selection would fail with `EmptyPool`
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Pick a uniformly random identity and count its use
    pub fn select_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<String, OptimizerError> {
        if self.identities.is_empty() {
            return Err(OptimizerError::EmptyPool);
        }
        let index = rng.random_range(0..self.identities.len());
        Ok(self.take(index))
    }

    /// Walk the identities in insertion order, wrapping at the end
    pub fn select_round_robin(&mut self) -> Result<String, OptimizerError> {
        if self.identities.is_empty() {
            return Err(OptimizerError::EmptyPool);
        }
        // the pool can grow between calls, so bound the cursor on read
        let index = self.cursor % self.identities.len();
        self.cursor = (index + 1) % self.identities.len();
        Ok(self.take(index))
    }

    fn take(&mut self, index: usize) -> String {
        let identity = &mut self.identities[index];
        identity.usage += 1;
        identity.value.clone()
    }

    /// Pool size and per-identity usage counts
    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            total: self.identities.len(),
            usage: self
                .identities
                .iter()
                .map(|i| (i.value.clone(), i.usage))
                .collect(),
        }
    }
}
