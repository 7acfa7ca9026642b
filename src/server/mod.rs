//! Server core functionality
//!
//! This module contains the asynchronous server, its configuration, the
//! session type and the registry that bounds live sessions.

pub mod config;
pub mod core;
pub mod registry;
pub mod session;
pub mod state;

pub use self::config::ServerConfig;
pub use self::core::AsyncServer;
pub use registry::ConnectionRegistry;
pub use session::{Session, SessionId};
pub use state::ServerState;
