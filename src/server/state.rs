//! Lifecycle state of the server.

/// Current state of an [`AsyncServer`](crate::AsyncServer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerState {
    /// Not listening.
    #[default]
    Stopped,
    /// Binding the listen socket.
    Starting,
    /// Accepting connections.
    Running,
    /// Closing the listener and every session.
    Stopping,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}
