//! Event notification
//!
//! Observer-style hooks through which the server and the client report
//! connection lifecycle, data and errors.

pub mod channel;
pub mod types;

pub use channel::{EventChannel, SubscriptionId};
pub use types::{
    ClientEvents, DataReceived, NetError, NetErrorReason, ServerEvents, ServerException,
};
