//! Client configuration
//!
//! Remote endpoint, retry policy and optional receive loop for the client.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::utils::TextEncoding;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;

/// Client configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hostname or IP literal of the server
    pub remote_host: String,
    pub remote_port: u16,
    /// Optional local endpoint to bind before connecting
    pub local_address: Option<SocketAddr>,
    /// Additional connect attempts after the first one fails
    pub retries: u32,
    /// Pause between connect attempts
    pub retry_interval_ms: u64,
    /// Start a receive loop once connected
    pub receive_enabled: bool,
    /// Encoding for `send_text`
    pub encoding: TextEncoding,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_host: "127.0.0.1".to_string(),
            remote_port: 8096,
            local_address: None,
            retries: DEFAULT_RETRIES,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            receive_enabled: false,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ClientConfig {
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            ..Self::default()
        }
    }

    pub fn local_address(mut self, local: SocketAddr) -> Self {
        self.local_address = Some(local);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn receive_enabled(mut self, enabled: bool) -> Self {
        self.receive_enabled = enabled;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn retry_interval_duration(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.remote_host.trim().is_empty() {
            return Err("client.remote_host cannot be empty".into());
        }
        if self.remote_port == 0 {
            return Err("client.remote_port cannot be 0".into());
        }
        Ok(())
    }
}

/// Where the client connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// Resolved by DNS on every connect attempt.
    Host(String),
    /// Fixed candidate list; the first reachable address wins.
    Addresses(Vec<IpAddr>),
}

impl RemoteTarget {
    /// IP literals become a one-element address list, anything else a host.
    pub fn parse(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => RemoteTarget::Addresses(vec![ip]),
            Err(_) => RemoteTarget::Host(host.to_string()),
        }
    }
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteTarget::Host(host) => write!(f, "{}", host),
            RemoteTarget::Addresses(addrs) => {
                let list: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
                write!(f, "[{}]", list.join(", "))
            }
        }
    }
}
