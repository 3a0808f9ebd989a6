//! Error types for the device client and its transports.
//!
//! [`ClientError`] is what the caller-facing API returns. Everything it
//! reports is decided locally and synchronously, before anything reaches the
//! transport. Failures the device itself reports travel as events and can be
//! turned into a [`ClientError::DeviceRejected`] with
//! [`ClientEvent::as_error`](crate::ClientEvent::as_error).

use crate::session::ConnectionState;
use bioscan_core::Modality;
use bioscan_protocol::{CodecError, Rejection};

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by [`DeviceClient`](crate::DeviceClient) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be opened, or the link failed.
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// The transport did not open within the configured timeout.
    #[error("Connection timeout after {duration_ms}ms")]
    ConnectionTimeout { duration_ms: u64 },

    /// The operation is not valid in the current session state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A connection attempt is already in progress.
    #[error("Connection attempt already in progress")]
    AlreadyConnecting,

    /// Cancel was requested but no capture is running on that sensor.
    #[error("No active {modality} capture")]
    NoActiveCapture { modality: Modality },

    /// The device reported a failure.
    #[error("Device rejected request (code {code}): {message}")]
    DeviceRejected { code: i32, message: String },

    /// The client has been closed.
    #[error("Client is not initialized")]
    NotInitialized,

    /// An argument failed local validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] bioscan_core::Error),
}

impl ClientError {
    /// Create a new invalid state error.
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Whether the caller can fix this by changing state or arguments.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. }
                | Self::AlreadyConnecting
                | Self::NoActiveCapture { .. }
                | Self::InvalidArgument(_)
                | Self::NotInitialized
        )
    }

    /// Session state named by an [`ClientError::InvalidState`].
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::InvalidState { state, .. } => Some(state),
            _ => None,
        }
    }
}

impl From<Rejection> for ClientError {
    fn from(rejection: Rejection) -> Self {
        Self::DeviceRejected {
            code: rejection.status.code(),
            message: rejection.message,
        }
    }
}

/// Convenience check used by the state guards.
pub(crate) fn require_state(
    operation: &'static str,
    current: ConnectionState,
    expected: ConnectionState,
) -> Result<()> {
    if current == expected {
        Ok(())
    } else {
        Err(ClientError::invalid_state(operation, current))
    }
}

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link is not open or the peer went away.
    #[error("Link closed")]
    Closed,

    /// I/O failure on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or body decoding failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport-specific failure.
    #[error("{0}")]
    Link(String),

    /// The message could not be framed. Nothing was written and the link
    /// is still usable.
    #[error("Message not sent: {0}")]
    NotSent(CodecError),
}

impl TransportError {
    /// Create a new link error.
    pub fn link(message: impl Into<String>) -> Self {
        Self::Link(message.into())
    }

    /// Whether the link is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotSent(_))
    }
}
