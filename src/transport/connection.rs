//! Module `connection`
//!
//! Owns one connected TCP socket. The write half lives in a dedicated writer
//! task fed by an unbounded queue, so sends never block the caller; the read
//! half is handed back to whoever drives the receive loop.

use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc};

/// Receive buffer size used when the socket cannot report its own.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 8192;

/// A connected socket shared between its owner, its writer task and its
/// receive loop.
pub struct Connection {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    shutdown: Notify,
    writable: Arc<AtomicBool>,
}

impl Connection {
    /// Splits `stream`, spawns its writer task and returns the read half.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(stream: TcpStream) -> io::Result<(Arc<Self>, OwnedReadHalf)> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writable = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_loop(writer, rx, peer_addr, Arc::clone(&writable)));

        let connection = Arc::new(Self {
            local_addr,
            peer_addr,
            outbound: Mutex::new(Some(tx)),
            shutdown: Notify::new(),
            writable,
        });
        Ok((connection, reader))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }

    /// True while the socket is open locally and the last write succeeded.
    pub fn is_alive(&self) -> bool {
        !self.is_closed() && self.writable.load(Ordering::SeqCst)
    }

    /// Queues `data` for the writer task. Returns `false` if the connection
    /// is closed or its writer has failed; nothing is queued in that case.
    pub fn enqueue(&self, data: Vec<u8>) -> bool {
        if !self.writable.load(Ordering::SeqCst) {
            return false;
        }
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(data).is_ok(),
            None => false,
        }
    }

    /// Shuts the socket down in both directions.
    ///
    /// Queued data is flushed before the write side closes; the receive loop
    /// is woken so it drops the read half. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let Some(tx) = self.outbound.lock().take() else {
            return false;
        };
        drop(tx);
        self.shutdown.notify_one();
        true
    }

    /// Resolves once [`close`](Self::close) is called.
    pub(crate) async fn closed(&self) {
        self.shutdown.notified().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Drains the outbound queue. Write failures are logged, never surfaced.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peer_addr: SocketAddr,
    writable: Arc<AtomicBool>,
) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            warn!("Send to {} failed: {}", peer_addr, e);
            writable.store(false, Ordering::SeqCst);
            return;
        }
    }

    // Peer may already have half-closed; that is not worth more than a trace.
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} reported: {}", peer_addr, e);
    }
}
