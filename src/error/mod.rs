//! Error handling
//!
//! Defines error types and handling for the socket framework.

pub mod handlers;
pub mod types;

pub use types::*;
