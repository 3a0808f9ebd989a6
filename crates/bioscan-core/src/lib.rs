//! Shared value types for the bioscan capture client.
//!
//! Everything here is plain data: slot indices, validated setting values,
//! the capture status catalogue and the constants behind them. The
//! protocol and device crates build on these types so that a value which
//! left the caller's hands has already been range-checked.

pub mod constants;
pub mod error;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use status::CaptureStatus;
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
