//! Socket plumbing shared by the server and the client.

pub mod connection;
pub(crate) mod receive;

pub use connection::{Connection, DEFAULT_RECEIVE_BUFFER_SIZE};
