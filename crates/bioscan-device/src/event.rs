//! Events delivered to the observer.

use crate::error::ClientError;
use bioscan_protocol::DeviceEvent;

/// Everything the client reports to its observer.
///
/// Connection lifecycle notifications are produced by the client itself;
/// everything else is a [`DeviceEvent`] forwarded from the device, plus the
/// synthetic cancel acknowledgements the client emits when a capture is cut
/// short by a disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClientEvent {
    /// The transport opened successfully.
    Connected,

    /// The session returned to `Disconnected`.
    Disconnected,

    /// The transport failed to open, or the link failed while connected.
    ConnectionError { message: String },

    /// The transport did not open in time.
    ConnectionTimeout { duration_ms: u64 },

    /// Notification from the device.
    Device(DeviceEvent),
}

impl ClientEvent {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::ConnectionError { .. } => "connection_error",
            Self::ConnectionTimeout { .. } => "connection_timeout",
            Self::Device(event) => event.name(),
        }
    }

    /// The device event, if this is one.
    pub fn as_device(&self) -> Option<&DeviceEvent> {
        match self {
            Self::Device(event) => Some(event),
            _ => None,
        }
    }

    /// The error this event reports, if any.
    ///
    /// Connection failures map to their `ClientError` counterparts and a
    /// failing capture status maps to [`ClientError::DeviceRejected`].
    pub fn as_error(&self) -> Option<ClientError> {
        match self {
            Self::ConnectionError { message } => Some(ClientError::connection(message.clone())),
            Self::ConnectionTimeout { duration_ms } => Some(ClientError::ConnectionTimeout {
                duration_ms: *duration_ms,
            }),
            Self::Device(event) => event.rejection().map(ClientError::from),
            _ => None,
        }
    }
}

impl From<DeviceEvent> for ClientEvent {
    fn from(event: DeviceEvent) -> Self {
        Self::Device(event)
    }
}
