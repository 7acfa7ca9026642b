//! Error types
//!
//! Defines the error type shared by the server, the client and the
//! transport plumbing underneath them.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Coarse classification of a [`SocketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller passed something unusable (closed session, bad address).
    InvalidArgument,
    /// Operation attempted while not running / not connected.
    InvalidState,
    /// Socket-level failure during accept, receive, send or connect.
    TransportFailure,
    /// The server registry is full.
    CapacityExceeded,
}

/// Errors raised by the socket framework
#[derive(Debug)]
pub enum SocketError {
    InvalidArgument(String),
    InvalidState(String),
    InvalidAddress(String),
    CapacityExceeded { max_clients: usize },
    Bind { addr: SocketAddr, source: io::Error },
    Resolve { host: String, source: io::Error },
    ConnectFailed { attempts: u32, source: io::Error },
    Transport(io::Error),
}

impl SocketError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SocketError::InvalidArgument(_) | SocketError::InvalidAddress(_) => {
                ErrorKind::InvalidArgument
            }
            SocketError::InvalidState(_) => ErrorKind::InvalidState,
            SocketError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            SocketError::Bind { .. }
            | SocketError::Resolve { .. }
            | SocketError::ConnectFailed { .. }
            | SocketError::Transport(_) => ErrorKind::TransportFailure,
        }
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            SocketError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            SocketError::InvalidAddress(addr) => write!(f, "Invalid address: {}", addr),
            SocketError::CapacityExceeded { max_clients } => {
                write!(f, "Connection limit reached ({} clients)", max_clients)
            }
            SocketError::Bind { addr, source } => {
                write!(f, "Failed to bind to {}: {}", addr, source)
            }
            SocketError::Resolve { host, source } => {
                write!(f, "Failed to resolve {}: {}", host, source)
            }
            SocketError::ConnectFailed { attempts, source } => {
                write!(f, "Connect failed after {} attempt(s): {}", attempts, source)
            }
            SocketError::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for SocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SocketError::Bind { source, .. }
            | SocketError::Resolve { source, .. }
            | SocketError::ConnectFailed { source, .. }
            | SocketError::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for SocketError {
    fn from(error: io::Error) -> Self {
        SocketError::Transport(error)
    }
}

pub type Result<T> = std::result::Result<T, SocketError>;
