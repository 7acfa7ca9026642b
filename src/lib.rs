//! Asynchronous TCP server and client exchanging raw byte datagrams, with
//! observer-style events for connection lifecycle, data and errors.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod server;
pub mod transport;
pub mod utils;

pub use client::{AsyncClient, ClientConfig, ClientState};
pub use self::config::AppConfig;
pub use error::{ErrorKind, Result, SocketError};
pub use event::{ClientEvents, EventChannel, ServerEvents, SubscriptionId};
pub use server::{AsyncServer, ServerConfig, ServerState, Session, SessionId};
pub use utils::TextEncoding;
