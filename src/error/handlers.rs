//! Error handlers
//!
//! Logging helpers used at the boundary of every I/O completion, where an
//! error has no synchronous caller to return to.

use crate::error::types::{ErrorKind, SocketError};
use log::{error, warn};

/// Handle an error raised inside a completion handler
pub fn handle_error(context: &str, err: &SocketError) {
    match err.kind() {
        ErrorKind::CapacityExceeded | ErrorKind::InvalidState => {
            warn!("{}: {}", context, err)
        }
        ErrorKind::InvalidArgument | ErrorKind::TransportFailure => {
            error!("{}: {}", context, err)
        }
    }
}
