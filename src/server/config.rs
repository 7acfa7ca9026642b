//! Server configuration
//!
//! Manages server configuration settings and validation.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, SocketError};
use crate::utils::TextEncoding;

pub const DEFAULT_MAX_CLIENTS: usize = 1024;
pub const DEFAULT_BACKLOG: u32 = 1024;
pub const DEFAULT_DATAGRAM_CAPACITY: usize = 64 * 1024;

/// Server configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to listen on
    pub bind_address: String,
    /// Port to listen on; 0 picks an ephemeral port
    pub port: u16,
    /// Maximum concurrent sessions
    pub max_clients: usize,
    /// Listen backlog used by `start()`
    pub backlog: u32,
    /// Per-session receive buffer size; `None` uses the socket's own size
    pub receive_buffer_size: Option<usize>,
    /// Upper bound of the per-session datagram accumulator; 0 disables it
    pub datagram_capacity: usize,
    /// Encoding for `send_text`
    pub encoding: TextEncoding,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8096,
            max_clients: DEFAULT_MAX_CLIENTS,
            backlog: DEFAULT_BACKLOG,
            receive_buffer_size: None,
            datagram_capacity: DEFAULT_DATAGRAM_CAPACITY,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ServerConfig {
    /// Listen on every interface at `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Listen on a specific endpoint.
    pub fn with_endpoint(endpoint: SocketAddr) -> Self {
        Self {
            bind_address: endpoint.ip().to_string(),
            port: endpoint.port(),
            ..Self::default()
        }
    }

    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = Some(size);
        self
    }

    pub fn datagram_capacity(mut self, capacity: usize) -> Self {
        self.datagram_capacity = capacity;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Parse bind address and port into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| SocketError::InvalidAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(format!(
                "server.bind_address '{}' is not an IP address",
                self.bind_address
            ));
        }
        if self.max_clients == 0 {
            return Err("server.max_clients must be greater than 0".into());
        }
        if self.backlog == 0 {
            return Err("server.backlog must be greater than 0".into());
        }
        if self.receive_buffer_size == Some(0) {
            return Err("server.receive_buffer_size must be greater than 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::new(9000);
        assert_eq!(config.max_clients, 1024);
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:9000".parse().unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_hostname_bind_address() {
        let config = ServerConfig {
            bind_address: "localhost".into(),
            ..ServerConfig::default()
        };
        assert!(config.socket_addr().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(ServerConfig::default().max_clients(0).validate().is_err());
        assert!(ServerConfig::default().backlog(0).validate().is_err());
    }
}
