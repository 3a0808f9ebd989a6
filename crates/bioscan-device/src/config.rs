//! Client configuration.

use bioscan_core::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HISTORY_LIMIT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`DeviceClient`](crate::DeviceClient).
///
/// Every field has a default, so a partial JSON document is accepted.
///
/// # Example
///
/// ```
/// use bioscan_device::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     connect_timeout_ms: 2_000,
///     ..ClientConfig::default()
/// };
/// assert_eq!(config.connect_timeout(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed for the transport to open, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Number of session state transitions kept for diagnostics.
    pub history_limit: usize,

    /// Name used in log output to tell clients apart.
    pub label: String,
}

impl ClientConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            label: "bioscan".to_string(),
        }
    }
}
