//! Transport trait definition.
//!
//! A transport is the link between the client and one physical (or
//! simulated) capture device. It moves [`Command`]s out and
//! [`DeviceEvent`]s in and knows nothing about sessions or captures.
//!
//! The methods return `impl Future + Send` rather than using bare
//! `async fn`, so the client can drive any transport from a spawned task.
//! Implementations are free to write them as `async fn`.
//!
//! **NOTE**: This trait is NOT object-safe. Use generics, or
//! [`AnyTransport`](crate::transports::AnyTransport) when the concrete
//! transport is only known at runtime.

use crate::error::TransportError;
use bioscan_protocol::{Command, DeviceEvent};
use std::future::Future;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Link to a capture device.
///
/// # Examples
///
/// ```
/// use bioscan_device::{Transport, mock::MockScanner};
/// use bioscan_protocol::{Command, DeviceEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), bioscan_device::TransportError> {
///     let (mut scanner, _handle) = MockScanner::new();
///     scanner.open().await?;
///     scanner.send(Command::GetBatteryPercentage).await?;
///
///     let event = scanner.recv().await?;
///     assert!(matches!(event, DeviceEvent::BatteryPercentage(_)));
///
///     scanner.close().await?;
///     Ok(())
/// }
/// ```
pub trait Transport: Send + 'static {
    /// Open the link. May take arbitrarily long; the caller applies its own
    /// timeout and may drop the future.
    fn open(&mut self) -> impl Future<Output = TransportResult<()>> + Send;

    /// Close the link. Closing a closed link succeeds.
    fn close(&mut self) -> impl Future<Output = TransportResult<()>> + Send;

    /// Hand one command to the device.
    fn send(&mut self, command: Command) -> impl Future<Output = TransportResult<()>> + Send;

    /// Wait for the next device event.
    ///
    /// Must be cancel-safe: dropping the future before it completes loses no
    /// event. An error means the link is unusable.
    fn recv(&mut self) -> impl Future<Output = TransportResult<DeviceEvent>> + Send;

    /// Human readable description for logs.
    fn describe(&self) -> String;
}
