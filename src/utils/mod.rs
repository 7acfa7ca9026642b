//! Utility functions
//!
//! Provides text encoding and logging setup.

pub mod encoding;
pub mod logging;

pub use encoding::TextEncoding;
