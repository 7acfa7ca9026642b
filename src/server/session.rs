//! Module `session`
//!
//! Defines the `Session` type representing one accepted client connection,
//! together with the datagram accumulator used to stitch partial reads back
//! together. The receive buffer itself is owned by the session's receive
//! loop and dropped with it.

use log::warn;
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

use crate::transport::Connection;

/// Unique identifier for a server session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Server-side state of one accepted connection.
///
/// The session exclusively owns its socket. It never emits events itself;
/// the server reports on its behalf. Once closed a session stays closed and
/// sending to it fails.
pub struct Session {
    id: SessionId,
    connection: Arc<Connection>,
    receive_buffer_size: usize,
    datagram: Mutex<Vec<u8>>,
    datagram_capacity: usize,
}

impl Session {
    /// Wraps an accepted stream. No bytes are read or written here.
    ///
    /// Returns the read half for the server's receive loop.
    pub(crate) fn create(
        stream: TcpStream,
        receive_buffer_size: usize,
        datagram_capacity: usize,
    ) -> io::Result<(Arc<Self>, OwnedReadHalf)> {
        let (connection, reader) = Connection::open(stream)?;
        let session = Arc::new(Self {
            id: SessionId::next(),
            connection,
            receive_buffer_size,
            datagram: Mutex::new(Vec::new()),
            datagram_capacity,
        });
        Ok((session, reader))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.connection.local_addr()
    }

    pub fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Fresh receive buffer for the session's receive loop.
    pub(crate) fn new_receive_buffer(&self) -> Vec<u8> {
        vec![0; self.receive_buffer_size]
    }

    pub(crate) fn enqueue(&self, data: Vec<u8>) -> bool {
        self.connection.enqueue(data)
    }

    /// Appends a received chunk to the datagram accumulator.
    ///
    /// The accumulator is bounded by the configured capacity; on overflow
    /// the stale bytes are discarded and only the newest chunk is kept.
    pub(crate) fn append_datagram(&self, chunk: &[u8]) {
        if self.datagram_capacity == 0 {
            return;
        }

        let mut datagram = self.datagram.lock();
        if datagram.len() + chunk.len() > self.datagram_capacity {
            warn!(
                "{}: datagram exceeded {} bytes without being consumed, discarding",
                self.id, self.datagram_capacity
            );
            datagram.clear();
        }
        let start = chunk.len().saturating_sub(self.datagram_capacity);
        datagram.extend_from_slice(&chunk[start..]);
    }

    /// Number of bytes accumulated and not yet taken.
    pub fn datagram_len(&self) -> usize {
        self.datagram.lock().len()
    }

    /// Takes everything accumulated so far.
    pub fn take_datagram(&self) -> Vec<u8> {
        std::mem::take(&mut *self.datagram.lock())
    }

    /// Takes the accumulated bytes up to and including the first `marker`,
    /// e.g. an application `<EOF>` tag. Returns `None` until the marker has
    /// arrived; bytes after it stay accumulated.
    pub fn take_datagram_until(&self, marker: &[u8]) -> Option<Vec<u8>> {
        if marker.is_empty() {
            return None;
        }

        let mut datagram = self.datagram.lock();
        let end = datagram
            .windows(marker.len())
            .position(|window| window == marker)?
            + marker.len();
        let rest = datagram.split_off(end);
        Some(std::mem::replace(&mut *datagram, rest))
    }

    /// Drops any accumulated datagram and releases its allocation.
    pub(crate) fn clear_datagram(&self) {
        let mut datagram = self.datagram.lock();
        datagram.clear();
        datagram.shrink_to_fit();
    }

    /// Shuts the socket down in both directions and releases it.
    pub(crate) fn close(&self) -> bool {
        self.connection.close()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}
