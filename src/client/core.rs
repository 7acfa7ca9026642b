use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream, lookup_host};

use crate::client::config::{ClientConfig, RemoteTarget};
use crate::client::state::ClientState;
use crate::error::handlers::handle_error;
use crate::error::{Result, SocketError};
use crate::event::ClientEvents;
use crate::transport::receive::{ReceiveHandler, spawn_receive_loop};
use crate::transport::{Connection, DEFAULT_RECEIVE_BUFFER_SIZE};

/// Asynchronous TCP client.
///
/// Connects to one of several candidate addresses, retrying a bounded
/// number of times, and reports its lifecycle through [`ClientEvents`].
/// Cloning yields another handle to the same client. Dropping the last
/// handle closes the connection.
#[derive(Clone)]
pub struct AsyncClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    target: RemoteTarget,
    state: Mutex<ClientState>,
    retries: AtomicU32,
    link: Mutex<Option<Link>>,
    events: ClientEvents,
}

/// The established connection. The read half stays parked here unless the
/// receive loop owns it.
struct Link {
    connection: Arc<Connection>,
    reader: Option<OwnedReadHalf>,
}

impl AsyncClient {
    /// Client for `config.remote_host`, which may be an IP literal or a
    /// hostname resolved on every connect attempt.
    pub fn new(config: ClientConfig) -> Self {
        let target = RemoteTarget::parse(&config.remote_host);
        Self::with_target(target, config)
    }

    /// Client for an explicit candidate list on `config.remote_port`.
    pub fn with_addresses(addresses: Vec<IpAddr>, config: ClientConfig) -> Self {
        Self::with_target(RemoteTarget::Addresses(addresses), config)
    }

    /// Client for a single endpoint with the default retry policy.
    pub fn to_endpoint(remote: SocketAddr) -> Self {
        let config = ClientConfig::new(remote.ip().to_string(), remote.port());
        Self::with_addresses(vec![remote.ip()], config)
    }

    fn with_target(target: RemoteTarget, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                target,
                state: Mutex::new(ClientState::Disconnected),
                retries: AtomicU32::new(0),
                link: Mutex::new(None),
                events: ClientEvents::default(),
            }),
        }
    }

    pub fn events(&self) -> &ClientEvents {
        &self.inner.events
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.inner.target
    }

    pub fn port(&self) -> u16 {
        self.inner.config.remote_port
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Retries consumed by the connect attempt in progress.
    pub fn retry_count(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    /// True while connected and the socket has not failed.
    pub fn is_connected(&self) -> bool {
        self.inner.live_connection().is_some()
    }

    /// The connected peer, or the first configured candidate otherwise.
    pub fn remote_endpoint(&self) -> Option<SocketAddr> {
        if let Some(link) = self.inner.link.lock().as_ref() {
            return Some(link.connection.peer_addr());
        }
        match &self.inner.target {
            RemoteTarget::Addresses(addrs) => addrs
                .first()
                .map(|ip| SocketAddr::new(*ip, self.inner.config.remote_port)),
            RemoteTarget::Host(_) => None,
        }
    }

    /// The bound local endpoint, or the configured one before connecting.
    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        match self.inner.link.lock().as_ref() {
            Some(link) => Some(link.connection.local_addr()),
            None => self.inner.config.local_address,
        }
    }

    /// Connects to the server.
    ///
    /// No-op while connected. Fails with `InvalidState` while another
    /// connect is in progress. A failed attempt emits
    /// `server_exception_occurred` and is retried up to `retries` times,
    /// `retry_interval` apart. Returns `ConnectFailed` once every attempt
    /// has failed.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ClientState::Connecting => {
                    return Err(SocketError::InvalidState(
                        "connect already in progress".into(),
                    ));
                }
                ClientState::Connected if self.inner.live_connection_locked() => return Ok(()),
                _ => *state = ClientState::Connecting,
            }
        }
        let mut guard = ConnectingGuard {
            inner: &self.inner,
            armed: true,
        };

        // A dead link left behind by a failed socket.
        if let Some(stale) = self.inner.link.lock().take() {
            stale.connection.close();
        }

        let max_attempts = self.inner.config.retries.saturating_add(1);
        let interval = self.inner.config.retry_interval_duration();
        self.inner.retries.store(0, Ordering::SeqCst);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.attempt().await {
                Ok((stream, buffer_size)) => {
                    guard.armed = false;
                    return self.inner.establish(stream, buffer_size);
                }
                Err(e) => {
                    let reported = SocketError::ConnectFailed {
                        attempts: attempt,
                        source: io::Error::new(e.kind(), e.to_string()),
                    };
                    handle_error(&format!("Connect to {}", self.inner.target), &reported);
                    self.inner
                        .events
                        .server_exception_occurred
                        .emit(&Arc::new(reported));

                    if attempt >= max_attempts {
                        return Err(SocketError::ConnectFailed {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    self.inner.retries.fetch_add(1, Ordering::SeqCst);
                    debug!(
                        "Retrying connect to {} in {:?} ({}/{})",
                        self.inner.target, interval, attempt, max_attempts
                    );
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// Closes the connection and emits `server_disconnected`. No-op unless
    /// connected.
    pub fn close(&self) {
        let link = {
            let mut state = self.inner.state.lock();
            if *state != ClientState::Connected {
                return;
            }
            *state = ClientState::Disconnected;
            self.inner.link.lock().take()
        };

        self.inner.retries.store(0, Ordering::SeqCst);
        if let Some(link) = link {
            link.connection.close();
            info!("Disconnected from {}", link.connection.peer_addr());
        }
        self.inner.events.server_disconnected.emit(&());
    }

    /// Queues `data` for the server; fire-and-forget.
    ///
    /// Fails with `InvalidState` and emits `server_disconnected` when not
    /// connected. Nothing is written in that case.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let queued = match self.inner.live_connection() {
            Some(connection) => connection.enqueue(data.into()),
            None => false,
        };
        if !queued {
            self.inner.mark_disconnected();
            self.inner.events.server_disconnected.emit(&());
            return Err(SocketError::InvalidState(
                "client has not connected to server".into(),
            ));
        }
        Ok(())
    }

    /// Encodes `text` with the configured encoding and sends it.
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(self.inner.config.encoding.encode(text))
    }
}

impl std::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("target", &self.inner.target)
            .field("port", &self.inner.config.remote_port)
            .field("state", &self.state())
            .finish()
    }
}

impl ClientInner {
    fn live_connection(&self) -> Option<Arc<Connection>> {
        if *self.state.lock() != ClientState::Connected {
            return None;
        }
        self.link
            .lock()
            .as_ref()
            .filter(|link| link.connection.is_alive())
            .map(|link| Arc::clone(&link.connection))
    }

    /// Same check as `live_connection` for callers already holding `state`.
    fn live_connection_locked(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.connection.is_alive())
    }

    /// Drops a dead link after a failed send.
    fn mark_disconnected(&self) {
        let mut state = self.state.lock();
        if *state == ClientState::Connected {
            *state = ClientState::Disconnected;
            if let Some(link) = self.link.lock().take() {
                link.connection.close();
            }
            warn!("Connection to {} lost", self.target);
        }
    }

    async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let port = self.config.remote_port;
        let candidates: Vec<SocketAddr> = match &self.target {
            RemoteTarget::Addresses(addrs) => {
                addrs.iter().map(|ip| SocketAddr::new(*ip, port)).collect()
            }
            RemoteTarget::Host(host) => lookup_host((host.as_str(), port)).await?.collect(),
        };
        if candidates.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} has no addresses", self.target),
            ));
        }
        Ok(candidates)
    }

    /// One connect attempt across every candidate; the first success wins.
    async fn attempt(&self) -> io::Result<(TcpStream, usize)> {
        let candidates = self.resolve().await?;
        let mut last_error = None;
        for addr in candidates {
            match self.connect_to(addr).await {
                Ok(connected) => return Ok(connected),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)))
    }

    async fn connect_to(&self, addr: SocketAddr) -> io::Result<(TcpStream, usize)> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(local) = self.config.local_address {
            socket.bind(local)?;
        }
        let buffer_size = socket
            .recv_buffer_size()
            .map(|size| size as usize)
            .unwrap_or(DEFAULT_RECEIVE_BUFFER_SIZE);
        let stream = socket.connect(addr).await?;
        Ok((stream, buffer_size))
    }

    fn establish(self: &Arc<Self>, stream: TcpStream, buffer_size: usize) -> Result<()> {
        let (connection, reader) = match Connection::open(stream) {
            Ok(opened) => opened,
            Err(e) => {
                *self.state.lock() = ClientState::Disconnected;
                return Err(e.into());
            }
        };

        *self.link.lock() = Some(Link {
            connection: Arc::clone(&connection),
            reader: Some(reader),
        });
        *self.state.lock() = ClientState::Connected;
        self.retries.store(0, Ordering::SeqCst);
        info!(
            "Connected to {} from {}",
            connection.peer_addr(),
            connection.local_addr()
        );
        self.events.server_connected.emit(&());

        if self.config.receive_enabled {
            let reader = match self.link.lock().as_mut() {
                Some(link) if Arc::ptr_eq(&link.connection, &connection) => link.reader.take(),
                _ => None,
            };
            if let Some(reader) = reader {
                let handler = ClientReceiver {
                    client: Arc::downgrade(self),
                    connection: Arc::clone(&connection),
                };
                spawn_receive_loop(connection, reader, vec![0; buffer_size], handler);
            }
        }
        Ok(())
    }

    fn handle_peer_closed(&self, connection: &Arc<Connection>) {
        connection.close();
        let link = {
            let mut state = self.state.lock();
            let mut slot = self.link.lock();
            let current = slot
                .as_ref()
                .is_some_and(|l| Arc::ptr_eq(&l.connection, connection));
            if !current {
                return;
            }
            *state = ClientState::Disconnected;
            slot.take()
        };
        drop(link);

        self.retries.store(0, Ordering::SeqCst);
        info!("Server {} closed the connection", connection.peer_addr());
        self.events.server_disconnected.emit(&());
    }
}

/// Returns the client to `Disconnected` if a connect is abandoned midway,
/// including when the `connect` future is dropped.
struct ConnectingGuard<'a> {
    inner: &'a ClientInner,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state.lock();
            if *state == ClientState::Connecting {
                *state = ClientState::Disconnected;
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.connection.close();
            debug!("Client dropped, closed link to {}", link.connection.peer_addr());
        }
    }
}

struct ClientReceiver {
    client: Weak<ClientInner>,
    connection: Arc<Connection>,
}

impl ReceiveHandler for ClientReceiver {
    fn is_active(&self) -> bool {
        !self.connection.is_closed() && self.client.strong_count() > 0
    }

    fn on_data(&self, chunk: &[u8]) {
        if let Some(client) = self.client.upgrade() {
            client.events.datagram_received.emit(&chunk.to_vec());
        }
    }

    fn on_closed(&self) {
        match self.client.upgrade() {
            Some(client) => client.handle_peer_closed(&self.connection),
            None => {
                self.connection.close();
            }
        }
    }

    fn on_error(&self, err: io::Error) {
        warn!("Receive from {} failed: {}", self.connection.peer_addr(), err);
        if let Some(client) = self.client.upgrade() {
            client
                .events
                .server_exception_occurred
                .emit(&Arc::new(SocketError::Transport(err)));
        }
    }
}
