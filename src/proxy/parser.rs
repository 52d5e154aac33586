//! Proxy list parsing: turns loosely formatted lines into pool addresses

use crate::proxy::models::{Proxy, ProxyType};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

static URL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|socks4|socks5h?)://(?:([^:@/]+):([^@/]+)@)?([^:@/]+):(\d+)/?$")
        .expect("Invalid proxy URL regex")
});

static AUTH_AT_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:@]+):([^@]+)@([^:@]+):(\d+)$").expect("Invalid user:pass@host:port regex")
});

/// Stateless parser for proxy list text
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - IP:PORT:USER:PASS
    /// - USER:PASS@IP:PORT
    /// - scheme://IP:PORT
    /// - scheme://USER:PASS@IP:PORT
    pub fn parse_line(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        Self::parse_url_format(line)
            .or_else(|| Self::parse_auth_at_format(line, default_type))
            .or_else(|| Self::parse_colon_format(line, default_type))
    }

    fn parse_url_format(line: &str) -> Option<Proxy> {
        let caps = URL_FORMAT.captures(line)?;
        let proxy_type = ProxyType::from_scheme(&caps[1])?;
        let host = caps[4].to_string();
        let port: u16 = caps[5].parse().ok()?;

        match (caps.get(2), caps.get(3)) {
            (Some(user), Some(pass)) => Some(Proxy::with_auth(
                host,
                port,
                proxy_type,
                user.as_str().to_string(),
                pass.as_str().to_string(),
            )),
            _ => Some(Proxy::new(host, port, proxy_type)),
        }
    }

    fn parse_auth_at_format(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let caps = AUTH_AT_FORMAT.captures(line)?;
        let port: u16 = caps[4].parse().ok()?;

        Some(Proxy::with_auth(
            caps[3].to_string(),
            port,
            default_type,
            caps[1].to_string(),
            caps[2].to_string(),
        ))
    }

    fn parse_colon_format(line: &str, default_type: ProxyType) -> Option<Proxy> {
        let parts: Vec<&str> = line.split(':').collect();

        match parts.as_slice() {
            [host, port] => Some(Proxy::new(host.to_string(), port.parse().ok()?, default_type)),
            [host, port, user, pass] => Some(Proxy::with_auth(
                host.to_string(),
                port.parse().ok()?,
                default_type,
                user.to_string(),
                pass.to_string(),
            )),
            _ => None,
        }
    }

    /// Parse every recognizable line, skipping blanks and comments
    pub fn parse_string(content: &str, default_type: ProxyType) -> Vec<Proxy> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type))
            .collect()
    }

    /// Normalize proxy lines into deduplicated pool addresses.
    ///
    /// Lines that cannot be parsed are logged and dropped.
    pub fn parse_addresses(content: &str, default_type: ProxyType) -> Vec<String> {
        let mut addresses: Vec<String> = Vec::new();
        for (number, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Self::parse_line(trimmed, default_type) {
                Some(proxy) => {
                    let address = proxy.address();
                    if !addresses.contains(&address) {
                        addresses.push(address);
                    }
                }
                None => warn!(line = number + 1, content = %trimmed, "Skipping unrecognized proxy line"),
            }
        }
        debug!(count = addresses.len(), "Parsed proxy addresses");
        addresses
    }

    /// Read a proxy list file into pool addresses
    pub fn parse_file<P: AsRef<Path>>(path: P, default_type: ProxyType) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_addresses(&content, default_type))
    }

    /// Write one address per line
    pub fn save_to_file<P: AsRef<Path>>(addresses: &[String], path: P) -> Result<()> {
        let mut content = addresses.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(path, content)?;
        Ok(())
    }
}
