use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

use socket_async::event::NetErrorReason;
use socket_async::utils::logging;
use socket_async::{
    AsyncClient, AsyncServer, ClientConfig, ClientState, ErrorKind, ServerConfig, ServerState,
};

const WAIT: Duration = Duration::from_secs(5);

// Helper to start a loopback server on an ephemeral port
fn start_server(max_clients: usize) -> (AsyncServer, SocketAddr) {
    logging::init();
    let config = ServerConfig::with_endpoint("127.0.0.1:0".parse().unwrap()).max_clients(max_clients);
    let server = AsyncServer::new(config);
    let addr = server.start().unwrap();
    (server, addr)
}

// Helper to await the next event or fail the test
async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

// Helper asserting nothing else arrives for a short while
async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    sleep(Duration::from_millis(150)).await;
    assert!(rx.try_recv().is_err());
}

// Drops `stream` with SO_LINGER 0 so the other side sees a reset, not a FIN
#[allow(deprecated)]
fn reset(stream: TcpStream) {
    stream.set_linger(Some(Duration::ZERO)).unwrap();
    drop(stream);
}

async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn quick_client(addr: SocketAddr) -> AsyncClient {
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .retries(0)
        .retry_interval(Duration::from_millis(10));
    AsyncClient::new(config)
}

#[tokio::test]
async fn test_capacity_invariant() {
    let (server, addr) = start_server(2);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let (_, mut exceptions) = server.events().server_exception.subscribe_channel();

    let _first = TcpStream::connect(addr).await.unwrap();
    next(&mut connected).await;
    let _second = TcpStream::connect(addr).await.unwrap();
    next(&mut connected).await;
    assert_eq!(server.client_count(), 2);

    let mut third = TcpStream::connect(addr).await.unwrap();
    let exception = next(&mut exceptions).await;
    assert!(exception.session.is_none());
    assert_eq!(exception.error.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(server.client_count(), 2);

    // The rejected socket is closed, not leaked.
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, third.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(read, 0);

    assert_quiet(&mut exceptions).await;
    assert_quiet(&mut connected).await;
    server.stop().await;
}

#[tokio::test]
async fn test_zero_byte_read_closes_session_once() {
    let (server, addr) = start_server(4);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let (_, mut disconnected) = server.events().client_disconnected.subscribe_channel();
    let (_, mut net_errors) = server.events().net_error.subscribe_channel();
    let (_, mut data) = server.events().data_received.subscribe_channel();

    let peer = TcpStream::connect(addr).await.unwrap();
    let session = next(&mut connected).await;
    drop(peer);

    let gone = next(&mut disconnected).await;
    assert_eq!(gone.id(), session.id());
    let error = next(&mut net_errors).await;
    assert!(matches!(error.reason, NetErrorReason::PeerClosed));

    assert!(session.is_closed());
    assert_eq!(server.client_count(), 0);
    assert!(!server.close_session(&session));
    assert_quiet(&mut disconnected).await;
    assert_quiet(&mut data).await;
    server.stop().await;
}

#[tokio::test]
async fn test_send_requires_connection() {
    let client = quick_client("127.0.0.1:9".parse().unwrap());
    let (_, mut disconnected) = client.events().server_disconnected.subscribe_channel();

    let err = client.send_text("hello").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(client.state(), ClientState::Disconnected);
    next(&mut disconnected).await;
}

#[tokio::test]
async fn test_chunks_arrive_in_order() {
    let (server, addr) = start_server(4);
    let (_, mut data) = server.events().data_received.subscribe_channel();

    let mut peer = TcpStream::connect(addr).await.unwrap();
    for chunk in [b"AAA", b"BBB", b"CCC"] {
        peer.write_all(chunk).await.unwrap();
        peer.flush().await.unwrap();
        sleep(Duration::from_millis(20)).await;
    }

    let mut received = Vec::new();
    while received.len() < 9 {
        received.extend(next(&mut data).await.data);
    }
    assert_eq!(received, b"AAABBBCCC");
    server.stop().await;
}

#[tokio::test]
async fn test_close_session_twice_is_noop() {
    let (server, addr) = start_server(4);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let (_, mut disconnected) = server.events().client_disconnected.subscribe_channel();

    let _keep = TcpStream::connect(addr).await.unwrap();
    let _closing = TcpStream::connect(addr).await.unwrap();
    next(&mut connected).await;
    let session = next(&mut connected).await;
    assert_eq!(server.client_count(), 2);

    assert!(server.close_session(&session));
    assert!(!server.close_session(&session));
    assert_eq!(server.client_count(), 1);

    next(&mut disconnected).await;
    assert_quiet(&mut disconnected).await;

    let err = server.send(&session, b"late".to_vec()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    server.stop().await;
}

#[tokio::test]
async fn test_end_to_end_single_slot() {
    let (server, addr) = start_server(1);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let (_, mut exceptions) = server.events().server_exception.subscribe_channel();
    let (_, mut data) = server.events().data_received.subscribe_channel();

    let first = quick_client(addr);
    first.connect().await.unwrap();
    let session = next(&mut connected).await;

    let second = quick_client(addr);
    second.connect().await.unwrap();
    let exception = next(&mut exceptions).await;
    assert_eq!(exception.error.kind(), ErrorKind::CapacityExceeded);

    first.send_text("hello").unwrap();
    let received = next(&mut data).await;
    assert_eq!(received.session.id(), session.id());
    assert_eq!(received.data, b"hello");

    assert_quiet(&mut connected).await;
    assert_eq!(server.client_count(), 1);

    first.close();
    second.close();
    server.stop().await;
}

#[tokio::test]
async fn test_server_replies_reach_client_receive_loop() {
    let (server, addr) = start_server(4);
    let echo = server.clone();
    server.events().data_received.subscribe(move |event| {
        let _ = echo.send(&event.session, event.data.clone());
    });

    let config = ClientConfig::new("127.0.0.1", addr.port()).receive_enabled(true);
    let client = AsyncClient::new(config);
    let (_, mut datagrams) = client.events().datagram_received.subscribe_channel();
    let (_, mut connected) = client.events().server_connected.subscribe_channel();
    let (_, mut disconnected) = client.events().server_disconnected.subscribe_channel();

    client.connect().await.unwrap();
    next(&mut connected).await;
    assert!(client.is_connected());
    assert_eq!(client.remote_endpoint(), Some(addr));

    client.send(b"ping<EOF>".to_vec()).unwrap();
    let mut echoed = Vec::new();
    while echoed.len() < 9 {
        echoed.extend(next(&mut datagrams).await);
    }
    assert_eq!(echoed, b"ping<EOF>");

    // Stopping the server closes the session; the client sees a zero-byte read.
    server.stop().await;
    next(&mut disconnected).await;
    assert!(!client.is_connected());
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn test_connect_retries_then_fails() {
    let port = unused_port().await;
    let config = ClientConfig::new("127.0.0.1", port)
        .retries(2)
        .retry_interval(Duration::from_millis(20));
    let client = AsyncClient::new(config);
    let (_, mut failures) = client.events().server_exception_occurred.subscribe_channel();

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert!(err.to_string().contains("3 attempt(s)"));

    for _ in 0..3 {
        next(&mut failures).await;
    }
    assert_quiet(&mut failures).await;
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn test_connect_succeeds_on_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ServerConfig::with_endpoint(addr);
    let server = AsyncServer::new(config);
    let delayed = server.clone();
    let starter = tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        delayed.start().unwrap();
    });

    let config = ClientConfig::new("127.0.0.1", addr.port())
        .retries(20)
        .retry_interval(Duration::from_millis(50));
    let client = AsyncClient::new(config);
    client.connect().await.unwrap();
    starter.await.unwrap();

    assert!(client.is_connected());
    assert_eq!(client.retry_count(), 0);
    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_stop_then_restart() {
    logging::init();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let server = AsyncServer::new(ServerConfig::with_endpoint(addr));
    assert_eq!(server.start().unwrap(), addr);
    let (_, mut disconnected) = server.events().client_disconnected.subscribe_channel();
    let (_, mut connected) = server.events().client_connected.subscribe_channel();

    let mut peer = TcpStream::connect(addr).await.unwrap();
    let session = next(&mut connected).await;

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!server.is_running());
    assert_eq!(server.client_count(), 0);
    next(&mut disconnected).await;

    let mut buf = [0u8; 4];
    assert_eq!(timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap(), 0);
    assert!(server.send_to(session.id(), b"x".to_vec()).is_err());

    let again = server.start().unwrap();
    assert_eq!(again, addr);
    assert!(server.is_running());

    let _peer = TcpStream::connect(addr).await.unwrap();
    next(&mut connected).await;
    server.stop().await;
}

#[tokio::test]
async fn test_send_text_uses_configured_encoding() {
    logging::init();
    let config = ServerConfig::with_endpoint("127.0.0.1:0".parse().unwrap())
        .encoding(socket_async::TextEncoding::Latin1);
    let server = AsyncServer::new(config);
    let addr = server.start().unwrap();
    let (_, mut connected) = server.events().client_connected.subscribe_channel();

    let mut peer = TcpStream::connect(addr).await.unwrap();
    let session = next(&mut connected).await;
    server.send_text(&session, "café").unwrap();

    let mut buf = [0u8; 4];
    timeout(WAIT, peer.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(buf, [b'c', b'a', b'f', 0xE9]);

    let sessions = server.sessions();
    assert_eq!(sessions.len(), 1);
    assert!(Arc::ptr_eq(&sessions[0], &session));
    server.stop().await;
}

#[tokio::test]
async fn test_send_after_stop_is_invalid_state() {
    let (server, addr) = start_server(4);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let _peer = TcpStream::connect(addr).await.unwrap();
    let session = next(&mut connected).await;

    server.stop().await;
    let err = server.send(&session, b"after stop".to_vec()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_bind_failure_is_synchronous() {
    let (running, addr) = start_server(1);
    let occupied = AsyncServer::new(ServerConfig::with_endpoint(addr));

    // Same port with SO_REUSEADDR still conflicts with an active listener.
    let err = occupied.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(occupied.state(), ServerState::Stopped);
    running.stop().await;
}

#[tokio::test]
async fn test_dropping_server_releases_port_and_sessions() {
    let (server, addr) = start_server(4);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();

    let mut peer = TcpStream::connect(addr).await.unwrap();
    next(&mut connected).await;

    let other = server.clone();
    drop(server);
    assert!(other.is_running());
    drop(other);

    let mut buf = [0u8; 4];
    assert_eq!(timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap(), 0);

    sleep(Duration::from_millis(200)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected() {
    let port = unused_port().await;
    let config = ClientConfig::new("127.0.0.1", port)
        .retries(3)
        .retry_interval(Duration::from_millis(100));
    let client = AsyncClient::new(config);
    let (_, mut disconnected) = client.events().server_disconnected.subscribe_channel();

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    sleep(Duration::from_millis(30)).await;
    assert_eq!(client.state(), ClientState::Connecting);

    let err = client.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(client.state(), ClientState::Connecting);

    let outcome = timeout(WAIT, first).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::TransportFailure);
    assert_eq!(client.state(), ClientState::Disconnected);
    assert!(disconnected.try_recv().is_err());
}

#[tokio::test]
async fn test_reset_reports_io_error_then_closes_once() {
    let (server, addr) = start_server(4);
    let (_, mut connected) = server.events().client_connected.subscribe_channel();
    let (_, mut disconnected) = server.events().client_disconnected.subscribe_channel();
    let (_, mut net_errors) = server.events().net_error.subscribe_channel();

    let peer = TcpStream::connect(addr).await.unwrap();
    let session = next(&mut connected).await;
    reset(peer);

    // The failed read is reported and re-armed; the next read sees the close.
    let failed = next(&mut net_errors).await;
    assert_eq!(failed.session.id(), session.id());
    assert!(matches!(failed.reason, NetErrorReason::Io(_)));

    let gone = next(&mut disconnected).await;
    assert_eq!(gone.id(), session.id());
    let closed = next(&mut net_errors).await;
    assert!(matches!(closed.reason, NetErrorReason::PeerClosed));

    assert_quiet(&mut disconnected).await;
    assert_eq!(server.client_count(), 0);
    assert!(session.is_closed());
    server.stop().await;
}

#[tokio::test]
async fn test_client_reset_reports_exception_then_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig::new("127.0.0.1", addr.port())
        .retries(0)
        .receive_enabled(true);
    let client = AsyncClient::new(config);
    let (_, mut exceptions) = client.events().server_exception_occurred.subscribe_channel();
    let (_, mut disconnected) = client.events().server_disconnected.subscribe_channel();

    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    reset(accepted.unwrap().0);

    let error = next(&mut exceptions).await;
    assert_eq!(error.kind(), ErrorKind::TransportFailure);
    next(&mut disconnected).await;
    assert_quiet(&mut disconnected).await;
    assert!(!client.is_connected());
    assert_eq!(client.state(), ClientState::Disconnected);
}
