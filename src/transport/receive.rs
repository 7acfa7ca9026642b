//! Module `receive`
//!
//! The receive loop shared by server sessions and the client. Each read
//! completion is handed to a [`ReceiveHandler`]; the next read is only issued
//! after the handler returns, so chunks for one connection are delivered in
//! arrival order.

use std::io;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;

use crate::transport::connection::{Connection, DEFAULT_RECEIVE_BUFFER_SIZE};

/// Reacts to read completions on one connection.
pub(crate) trait ReceiveHandler: Send + 'static {
    /// Checked before every read and after every completion.
    fn is_active(&self) -> bool;

    /// `chunk` borrows the receive buffer and is overwritten by the next read.
    fn on_data(&self, chunk: &[u8]);

    /// The peer closed its side (zero-byte read). The loop stops afterwards.
    fn on_closed(&self);

    /// A read failed. The loop re-arms afterwards.
    fn on_error(&self, err: io::Error);
}

pub(crate) fn spawn_receive_loop<H: ReceiveHandler>(
    connection: Arc<Connection>,
    reader: OwnedReadHalf,
    buffer: Vec<u8>,
    handler: H,
) -> JoinHandle<()> {
    tokio::spawn(receive_loop(connection, reader, buffer, handler))
}

async fn receive_loop<H: ReceiveHandler>(
    connection: Arc<Connection>,
    mut reader: OwnedReadHalf,
    mut buffer: Vec<u8>,
    handler: H,
) {
    if buffer.is_empty() {
        buffer.resize(DEFAULT_RECEIVE_BUFFER_SIZE, 0);
    }

    while handler.is_active() {
        let read = tokio::select! {
            _ = connection.closed() => break,
            read = reader.read(&mut buffer) => read,
        };

        if !handler.is_active() {
            break;
        }

        match read {
            Ok(0) => {
                handler.on_closed();
                break;
            }
            Ok(n) => handler.on_data(&buffer[..n]),
            Err(e) => handler.on_error(e),
        }
    }
}
