use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

use crate::error::handlers::handle_error;
use crate::error::{Result, SocketError};
use crate::event::{DataReceived, NetError, NetErrorReason, ServerEvents, ServerException};
use crate::server::config::ServerConfig;
use crate::server::registry::ConnectionRegistry;
use crate::server::session::{Session, SessionId};
use crate::server::state::ServerState;
use crate::transport::DEFAULT_RECEIVE_BUFFER_SIZE;
use crate::transport::receive::{ReceiveHandler, spawn_receive_loop};

/// Asynchronous TCP server.
///
/// Accepts connections into a bounded registry of [`Session`]s, runs one
/// receive loop per session and reports everything through
/// [`ServerEvents`]. Cloning yields another handle to the same server.
///
/// Dropping the last handle closes the listener and every session without
/// emitting events. A subscriber that captures a handle keeps the server
/// alive until [`stop`](Self::stop) is called.
///
/// ```ignore
/// let server = AsyncServer::new(ServerConfig::new(8096).max_clients(16));
///
/// let echo = server.clone();
/// server.events().data_received.subscribe(move |event| {
///     let _ = echo.send(&event.session, event.data.clone());
/// });
///
/// server.start()?;
/// ```
#[derive(Clone)]
pub struct AsyncServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: ServerConfig,
    state: Mutex<ServerState>,
    running: AtomicBool,
    registry: Mutex<ConnectionRegistry>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    receive_buffer_size: AtomicUsize,
    events: ServerEvents,
}

impl AsyncServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = ConnectionRegistry::new(config.max_clients);
        Self {
            inner: Arc::new(ServerInner {
                config,
                state: Mutex::new(ServerState::Stopped),
                running: AtomicBool::new(false),
                registry: Mutex::new(registry),
                local_addr: Mutex::new(None),
                accept_task: Mutex::new(None),
                receive_buffer_size: AtomicUsize::new(DEFAULT_RECEIVE_BUFFER_SIZE),
                events: ServerEvents::default(),
            }),
        }
    }

    /// Server on every interface at `port` with default limits.
    pub fn bind_port(port: u16) -> Self {
        Self::new(ServerConfig::new(port))
    }

    pub fn events(&self) -> &ServerEvents {
        &self.inner.events
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Actual listen address while running (useful after binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    pub fn client_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    pub fn max_clients(&self) -> usize {
        self.inner.config.max_clients
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.registry.lock().snapshot()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.inner.registry.lock().get(id)
    }

    /// Starts listening with the configured backlog.
    ///
    /// See [`start_with_backlog`](Self::start_with_backlog).
    pub fn start(&self) -> Result<SocketAddr> {
        self.start_with_backlog(self.inner.config.backlog)
    }

    /// Binds, listens and spawns the accept loop.
    ///
    /// Returns the bound address. Calling it while already running returns
    /// the current address. Bind or listen failures are returned here and
    /// leave the server stopped. Must be called from within a tokio runtime.
    pub fn start_with_backlog(&self, backlog: u32) -> Result<SocketAddr> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ServerState::Stopped => *state = ServerState::Starting,
                ServerState::Running => {
                    return self.inner.local_addr.lock().ok_or_else(|| {
                        SocketError::InvalidState("running without a listen address".into())
                    });
                }
                other => {
                    return Err(SocketError::InvalidState(format!(
                        "cannot start while {}",
                        other
                    )));
                }
            }
        }

        let listener = match self.inner.open_listener(backlog) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Server startup failed: {}", e);
                *self.inner.state.lock() = ServerState::Stopped;
                return Err(e);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                *self.inner.state.lock() = ServerState::Stopped;
                return Err(e.into());
            }
        };

        self.inner.registry.lock().drain();
        *self.inner.local_addr.lock() = Some(local_addr);
        self.inner.running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(accept_loop(Arc::downgrade(&self.inner), listener));
        *self.inner.accept_task.lock() = Some(task);
        *self.inner.state.lock() = ServerState::Running;

        info!(
            "Server listening on {} (max {} clients, backlog {})",
            local_addr, self.inner.config.max_clients, backlog
        );
        Ok(local_addr)
    }

    /// Closes the listening socket and every live session.
    ///
    /// Resolves once the listener is released, so the port can be bound
    /// again straight away. No-op unless running.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != ServerState::Running {
                return;
            }
            *state = ServerState::Stopping;
        }

        self.inner.running.store(false, Ordering::SeqCst);
        let task = self.inner.accept_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        self.inner.close_all_clients();
        let addr = self.inner.local_addr.lock().take();
        *self.inner.state.lock() = ServerState::Stopped;

        if let Some(addr) = addr {
            info!("Server on {} stopped", addr);
        }
    }

    /// Queues `data` for `session`. Delivery is fire-and-forget; write
    /// failures are only logged.
    pub fn send(&self, session: &Session, data: impl Into<Vec<u8>>) -> Result<()> {
        if !self.is_running() {
            return Err(SocketError::InvalidState(
                "server has not been started".into(),
            ));
        }
        if session.is_closed() || !session.enqueue(data.into()) {
            return Err(SocketError::InvalidArgument(format!(
                "{} is closed",
                session.id()
            )));
        }
        Ok(())
    }

    /// Encodes `text` with the configured encoding and sends it.
    pub fn send_text(&self, session: &Session, text: &str) -> Result<()> {
        self.send(session, self.inner.config.encoding.encode(text))
    }

    pub fn send_to(&self, id: SessionId, data: impl Into<Vec<u8>>) -> Result<()> {
        let session = self
            .session(id)
            .ok_or_else(|| SocketError::InvalidArgument(format!("unknown {}", id)))?;
        self.send(&session, data)
    }

    /// Removes `session` from the registry, closes it and emits
    /// `client_disconnected`. Returns `false` if it was already removed.
    pub fn close_session(&self, session: &Session) -> bool {
        self.inner.close_session(session.id())
    }

    /// Closes every live session; the registry ends up empty.
    pub fn close_all_clients(&self) {
        self.inner.close_all_clients();
    }
}

impl std::fmt::Debug for AsyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncServer")
            .field("bind_address", &self.inner.config.bind_address)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .field("clients", &self.client_count())
            .finish()
    }
}

impl ServerInner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn open_listener(&self, backlog: u32) -> Result<TcpListener> {
        let addr = self.config.socket_addr()?;
        let bind_err = |source: io::Error| SocketError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;

        let buffer_size = match self.config.receive_buffer_size {
            Some(size) => size,
            None => socket
                .recv_buffer_size()
                .map(|size| size as usize)
                .unwrap_or(DEFAULT_RECEIVE_BUFFER_SIZE),
        };
        self.receive_buffer_size.store(buffer_size, Ordering::SeqCst);

        socket.bind(addr).map_err(bind_err)?;
        socket.listen(backlog).map_err(bind_err)
    }

    /// Registers a freshly accepted stream or rejects it when full.
    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let buffer_size = self.receive_buffer_size.load(Ordering::SeqCst);
        let (session, reader) =
            match Session::create(stream, buffer_size, self.config.datagram_capacity) {
                Ok(created) => created,
                Err(e) => {
                    self.raise_server_exception(None, SocketError::Transport(e));
                    return;
                }
            };

        let admitted = {
            let mut registry = self.registry.lock();
            registry
                .add(Arc::clone(&session))
                .map(|_| registry.len())
        };

        match admitted {
            Ok(count) => {
                info!(
                    "Client {} connected as {} ({}/{} clients)",
                    peer,
                    session.id(),
                    count,
                    self.config.max_clients
                );
                self.events.client_connected.emit(&session);

                let buffer = session.new_receive_buffer();
                let connection = Arc::clone(session.connection());
                let handler = SessionReceiver {
                    server: Arc::downgrade(self),
                    session,
                };
                spawn_receive_loop(connection, reader, buffer, handler);
            }
            Err(e) => {
                session.close();
                drop(reader);
                self.raise_server_exception(None, e);
            }
        }
    }

    fn close_session(&self, id: SessionId) -> bool {
        let removed = self.registry.lock().remove(id);
        let Some(session) = removed else {
            return false;
        };

        session.clear_datagram();
        session.close();
        info!("Client {} ({}) disconnected", session.peer_addr(), id);
        self.events.client_disconnected.emit(&session);
        true
    }

    fn close_all_clients(&self) {
        let sessions = self.registry.lock().drain();
        if !sessions.is_empty() {
            info!("Closing {} client session(s)", sessions.len());
        }
        for session in sessions {
            session.clear_datagram();
            session.close();
            self.events.client_disconnected.emit(&session);
        }
    }

    fn raise_server_exception(&self, session: Option<Arc<Session>>, error: SocketError) {
        handle_error("Server exception", &error);
        self.events.server_exception.emit(&ServerException {
            session,
            error: Arc::new(error),
        });
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }

        let sessions = self.registry.get_mut().drain();
        for session in &sessions {
            session.clear_datagram();
            session.close();
        }
        if let Some(addr) = self.local_addr.get_mut().take() {
            info!(
                "Server on {} dropped, closed {} client session(s)",
                addr,
                sessions.len()
            );
        }
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after `failures` consecutive accept errors (e.g. EMFILE).
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Accepts until the server stops or is dropped. Accept failures are
/// reported and retried after a growing pause.
async fn accept_loop(server: Weak<ServerInner>, listener: TcpListener) {
    let mut failures: u32 = 0;
    loop {
        let accepted = listener.accept().await;
        let Some(inner) = server.upgrade() else {
            break;
        };
        if !inner.is_running() {
            break;
        }
        match accepted {
            Ok((stream, peer)) => {
                failures = 0;
                inner.admit(stream, peer);
            }
            Err(e) => {
                inner.raise_server_exception(None, SocketError::Transport(e));
                drop(inner);
                failures = failures.saturating_add(1);
                tokio::time::sleep(accept_backoff(failures)).await;
            }
        }
    }
    debug!("Accept loop finished");
}

/// Routes read completions of one session to the server's events.
struct SessionReceiver {
    server: Weak<ServerInner>,
    session: Arc<Session>,
}

impl ReceiveHandler for SessionReceiver {
    fn is_active(&self) -> bool {
        !self.session.is_closed()
            && self
                .server
                .upgrade()
                .is_some_and(|server| server.is_running())
    }

    fn on_data(&self, chunk: &[u8]) {
        let Some(server) = self.server.upgrade() else {
            return;
        };
        self.session.append_datagram(chunk);
        server.events.data_received.emit(&DataReceived {
            session: Arc::clone(&self.session),
            data: chunk.to_vec(),
        });
    }

    fn on_closed(&self) {
        debug!("{} closed by peer", self.session.id());
        let Some(server) = self.server.upgrade() else {
            return;
        };
        server.close_session(self.session.id());
        server.events.net_error.emit(&NetError {
            session: Arc::clone(&self.session),
            reason: NetErrorReason::PeerClosed,
        });
    }

    fn on_error(&self, err: io::Error) {
        warn!("Receive on {} failed: {}", self.session.id(), err);
        let Some(server) = self.server.upgrade() else {
            return;
        };
        server.events.net_error.emit(&NetError {
            session: Arc::clone(&self.session),
            reason: NetErrorReason::Io(Arc::new(err)),
        });
    }
}
