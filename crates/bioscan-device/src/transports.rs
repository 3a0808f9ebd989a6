//! Enum wrapper for transport dispatch.
//!
//! [`Transport`] uses native async methods and is not object-safe, so a
//! transport chosen at runtime (from configuration or a command line flag)
//! is wrapped in [`AnyTransport`] instead of a `Box<dyn Transport>`.
//!
//! # Examples
//!
//! ```
//! use bioscan_device::{AnyTransport, DeviceClient, ClientConfig};
//! use bioscan_device::mock::MockScanner;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (scanner, _handle) = MockScanner::new();
//!     let client = DeviceClient::new(AnyTransport::Mock(scanner), ClientConfig::default());
//!     assert!(client.connect().is_ok());
//! }
//! ```

use crate::link::{LinkTransport, TcpConnector};
use crate::mock::MockScanner;
use crate::transport::{Transport, TransportResult};
use bioscan_protocol::{Command, DeviceEvent};

/// Any of the built-in transports.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// In-process simulated scanner.
    Mock(MockScanner),

    /// Framed link over TCP.
    Tcp(LinkTransport<TcpConnector>),
}

impl From<MockScanner> for AnyTransport {
    fn from(scanner: MockScanner) -> Self {
        Self::Mock(scanner)
    }
}

impl From<LinkTransport<TcpConnector>> for AnyTransport {
    fn from(link: LinkTransport<TcpConnector>) -> Self {
        Self::Tcp(link)
    }
}

impl Transport for AnyTransport {
    async fn open(&mut self) -> TransportResult<()> {
        match self {
            Self::Mock(transport) => transport.open().await,
            Self::Tcp(transport) => transport.open().await,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self {
            Self::Mock(transport) => transport.close().await,
            Self::Tcp(transport) => transport.close().await,
        }
    }

    async fn send(&mut self, command: Command) -> TransportResult<()> {
        match self {
            Self::Mock(transport) => transport.send(command).await,
            Self::Tcp(transport) => transport.send(command).await,
        }
    }

    async fn recv(&mut self) -> TransportResult<DeviceEvent> {
        match self {
            Self::Mock(transport) => transport.recv().await,
            Self::Tcp(transport) => transport.recv().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Mock(transport) => transport.describe(),
            Self::Tcp(transport) => transport.describe(),
        }
    }
}
