//! Lifecycle state of the client.

/// Current state of an [`AsyncClient`](crate::AsyncClient).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// No connection to the server.
    #[default]
    Disconnected,
    /// A connect attempt (or its retries) is in progress.
    Connecting,
    /// Connected and ready to send.
    Connected,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}
