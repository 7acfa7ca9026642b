//! Event payloads and the per-endpoint event sets.

use std::io;
use std::sync::Arc;

use crate::error::SocketError;
use crate::event::channel::EventChannel;
use crate::server::Session;

/// Bytes read from a session, copied out of its receive buffer.
#[derive(Debug, Clone)]
pub struct DataReceived {
    pub session: Arc<Session>,
    pub data: Vec<u8>,
}

/// Why a session reported a network error.
#[derive(Debug, Clone)]
pub enum NetErrorReason {
    /// The peer closed the connection (zero-byte read).
    PeerClosed,
    /// A receive failed at the socket level.
    Io(Arc<io::Error>),
}

#[derive(Debug, Clone)]
pub struct NetError {
    pub session: Arc<Session>,
    pub reason: NetErrorReason,
}

/// Server-level failure, optionally tied to a session.
///
/// Capacity rejections and accept failures carry no session.
#[derive(Debug, Clone)]
pub struct ServerException {
    pub session: Option<Arc<Session>>,
    pub error: Arc<SocketError>,
}

/// Events published by an [`AsyncServer`](crate::AsyncServer).
#[derive(Debug)]
pub struct ServerEvents {
    pub client_connected: EventChannel<Arc<Session>>,
    pub client_disconnected: EventChannel<Arc<Session>>,
    pub data_received: EventChannel<DataReceived>,
    pub net_error: EventChannel<NetError>,
    pub server_exception: EventChannel<ServerException>,
}

impl Default for ServerEvents {
    fn default() -> Self {
        Self {
            client_connected: EventChannel::new("client_connected"),
            client_disconnected: EventChannel::new("client_disconnected"),
            data_received: EventChannel::new("data_received"),
            net_error: EventChannel::new("net_error"),
            server_exception: EventChannel::new("server_exception"),
        }
    }
}

/// Events published by an [`AsyncClient`](crate::AsyncClient).
#[derive(Debug)]
pub struct ClientEvents {
    pub server_connected: EventChannel<()>,
    pub server_disconnected: EventChannel<()>,
    pub datagram_received: EventChannel<Vec<u8>>,
    pub server_exception_occurred: EventChannel<Arc<SocketError>>,
}

impl Default for ClientEvents {
    fn default() -> Self {
        Self {
            server_connected: EventChannel::new("server_connected"),
            server_disconnected: EventChannel::new("server_disconnected"),
            datagram_received: EventChannel::new("datagram_received"),
            server_exception_occurred: EventChannel::new("server_exception_occurred"),
        }
    }
}
