//! Mock device implementations for testing and development.
//!
//! The mock scanner simulates a fingerprint and iris capture peripheral
//! in-process. It is controlled through a handle returned alongside it.

pub mod scanner;

pub use scanner::{ConnectBehavior, MockScanner, MockScannerHandle};
