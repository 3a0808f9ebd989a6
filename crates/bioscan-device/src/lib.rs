//! Client for fingerprint and iris capture devices.
//!
//! This crate provides [`DeviceClient`], a non-blocking façade over one
//! capture peripheral. The caller issues commands; the device's replies,
//! capture previews and final frames come back as [`ClientEvent`]s on a
//! single registered [`Observer`] (or an [`EventStream`]).
//!
//! # Design
//!
//! - **Fire and forget**: every command returns immediately. The only error
//!   an operation returns directly is a local one (wrong session state,
//!   nothing to cancel, bad argument, closed client), and such an operation
//!   never reaches the device.
//! - **Serialized delivery**: the observer is invoked from one task, one
//!   event at a time, in the order events were produced.
//! - **One capture per sensor**: starting a second fingerprint (or iris)
//!   capture while one is running is rejected, never queued.
//! - **No settings cache**: every getter round-trips to the device.
//!
//! # Transports
//!
//! The [`Transport`] trait is the link to the device. Two implementations
//! ship with the crate:
//!
//! - [`mock::MockScanner`]: in-process simulated scanner for development
//!   and tests.
//! - [`LinkTransport`]: framed link over any async byte stream, with
//!   [`TcpConnector`] for TCP endpoints.
//!
//! [`AnyTransport`] picks one at runtime.
//!
//! # Example
//!
//! ```
//! use bioscan_core::SlotIndex;
//! use bioscan_device::mock::MockScanner;
//! use bioscan_device::{ClientConfig, ClientEvent, DeviceClient};
//! use bioscan_protocol::DeviceEvent;
//!
//! #[tokio::main]
//! async fn main() -> bioscan_device::Result<()> {
//!     let (scanner, _handle) = MockScanner::new();
//!     let client = DeviceClient::new(scanner, ClientConfig::default());
//!     let mut events = client.subscribe()?;
//!
//!     client.connect()?;
//!     events.recv().await;
//!
//!     client.start_capture_one_finger(SlotIndex::new(3))?;
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Device(DeviceEvent::LastFrame { saved_at, .. }) = event {
//!             assert_eq!(saved_at, SlotIndex::new(3));
//!             break;
//!         }
//!     }
//!     assert!(!client.is_fp_capturing());
//!
//!     client.close_and_wait().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
mod driver;
pub mod error;
pub mod event;
pub mod link;
pub mod mock;
pub mod session;
pub mod transport;
pub mod transports;

pub use client::DeviceClient;
pub use config::ClientConfig;
pub use dispatcher::{EventStream, Observer};
pub use error::{ClientError, Result, TransportError};
pub use event::ClientEvent;
pub use link::{Connector, LinkTransport, TcpConnector};
pub use session::{CaptureRequest, ConnectionState, TransitionRecord};
pub use transport::{Transport, TransportResult};
pub use transports::AnyTransport;
