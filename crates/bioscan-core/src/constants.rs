//! Constants shared by the bioscan crates.
//!
//! The setting ranges mirror what the capture peripheral accepts. They are
//! checked on the client side only to catch caller mistakes early; the
//! device stays authoritative and may still reject a value.
//!
//! # Usage
//!
//! ```
//! use bioscan_core::constants::*;
//!
//! assert_eq!(CLEAR_ALL_SLOTS_SENTINEL, -1);
//! assert!(MIN_NFIQ_SCORE <= MAX_NFIQ_SCORE);
//! ```

// ============================================================================
// Saved image slots
// ============================================================================

/// Wire value meaning "every slot" in a clear-saved-images command and its reply.
pub const CLEAR_ALL_SLOTS_SENTINEL: i32 = -1;

// ============================================================================
// Settings ranges
// ============================================================================

/// Minimum LED brightness.
pub const MIN_LED_BRIGHTNESS: u8 = 0;

/// Maximum LED brightness.
pub const MAX_LED_BRIGHTNESS: u8 = 100;

/// Best (lowest) NFIQ score.
pub const MIN_NFIQ_SCORE: u8 = 1;

/// Worst (highest) NFIQ score.
pub const MAX_NFIQ_SCORE: u8 = 5;

/// Lowest duplicate-finger security level.
pub const MIN_SECURITY_LEVEL: u8 = 1;

/// Highest duplicate-finger security level.
pub const MAX_SECURITY_LEVEL: u8 = 7;

/// Security level used when the caller has no preference.
pub const DEFAULT_SECURITY_LEVEL: u8 = 3;

/// Longest auto power-off delay in seconds (one hour). Zero disables it.
pub const MAX_POWER_OFF_SECONDS: u32 = 3600;

/// Highest mode value for the power and fingerprint LEDs.
pub const MAX_MULTI_MODE_LED: u8 = 3;

/// Highest mode value for the communication and iris LEDs (on/off only).
pub const MAX_BINARY_LED: u8 = 1;

/// Battery percentage upper bound.
pub const MAX_BATTERY_PERCENTAGE: u8 = 100;

/// Firmware transfer result reported when the image never left the client.
///
/// Device results are 0 (success) through 5.
pub const FIRMWARE_RESULT_NOT_SENT: i64 = -1;

// ============================================================================
// Client defaults
// ============================================================================

/// Default time allowed for the transport to open, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default number of session transitions kept for diagnostics.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;
