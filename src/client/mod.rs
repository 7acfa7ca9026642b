//! Client side
//!
//! The asynchronous client, its configuration and connection state.

pub mod config;
pub mod core;
pub mod state;

pub use self::config::{ClientConfig, RemoteTarget};
pub use self::core::AsyncClient;
pub use state::ClientState;
