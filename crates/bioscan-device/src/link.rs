//! Byte-stream transport.
//!
//! [`LinkTransport`] carries the link over any async byte stream, framing
//! both directions with [`LinkCodec`]. Where the stream comes from is a
//! [`Connector`]'s business: [`TcpConnector`] dials a TCP endpoint (a device
//! bridge, or a simulator), tests hand in an in-memory duplex.
//!
//! # Architecture
//!
//! ```text
//! DeviceClient driver
//!     │
//!     └─> LinkTransport ──(Connector::connect)──> byte stream ───> device
//!              │
//!              └─> LinkCodec (STX | len | JSON | checksum | ETX)
//! ```

use crate::error::TransportError;
use crate::transport::{Transport, TransportResult};
use bioscan_protocol::{CodecError, Command, DeviceEvent, LinkCodec};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

/// Client side codec: commands out, events in.
pub type ClientCodec = LinkCodec<Command, DeviceEvent>;

/// Produces the byte stream a [`LinkTransport`] runs over.
pub trait Connector: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Establish a fresh stream. Called on every `open`.
    fn connect(&mut self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Where the stream goes, for logs.
    fn describe(&self) -> String;
}

/// Dials a TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&mut self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(self.addr).await?;

        // Capture previews are latency sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", self.addr, e);
        }
        Ok(stream)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Transport over a framed byte stream.
///
/// # Example
///
/// ```no_run
/// use bioscan_device::{LinkTransport, Transport};
/// use bioscan_protocol::Command;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut link = LinkTransport::tcp("127.0.0.1:7500".parse()?);
/// link.open().await?;
/// link.send(Command::GetBatteryPercentage).await?;
/// let event = link.recv().await?;
/// println!("{:?}", event);
/// # Ok(())
/// # }
/// ```
pub struct LinkTransport<C: Connector> {
    connector: C,
    codec: ClientCodec,
    framed: Option<Framed<C::Stream, ClientCodec>>,
}

impl LinkTransport<TcpConnector> {
    /// Transport that dials `addr` over TCP.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(TcpConnector::new(addr))
    }
}

impl<C: Connector> LinkTransport<C> {
    pub fn new(connector: C) -> Self {
        Self::with_codec(connector, LinkCodec::new())
    }

    /// Use a codec with non-default limits.
    pub fn with_codec(connector: C, codec: ClientCodec) -> Self {
        debug!("Creating link transport for {}", connector.describe());
        Self {
            connector,
            codec,
            framed: None,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_open(&self) -> bool {
        self.framed.is_some()
    }
}

impl<C: Connector> std::fmt::Debug for LinkTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTransport")
            .field("endpoint", &self.connector.describe())
            .field("open", &self.framed.is_some())
            .finish()
    }
}

impl<C: Connector> Transport for LinkTransport<C> {
    async fn open(&mut self) -> TransportResult<()> {
        if self.framed.is_some() {
            return Ok(());
        }

        let stream = self.connector.connect().await?;
        self.framed = Some(Framed::new(stream, self.codec.clone()));
        debug!("Link to {} open", self.connector.describe());
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        let Some(framed) = self.framed.take() else {
            return Ok(());
        };

        let mut stream = framed.into_inner();
        if let Err(e) = stream.shutdown().await {
            // The peer may already be gone; the link is closed either way.
            debug!("Shutdown of {} failed: {}", self.connector.describe(), e);
        }
        debug!("Link to {} closed", self.connector.describe());
        Ok(())
    }

    async fn send(&mut self, command: Command) -> TransportResult<()> {
        let framed = self.framed.as_mut().ok_or(TransportError::Closed)?;
        trace!("Sending {} to {}", command, self.connector.describe());
        match framed.send(command).await {
            Ok(()) => Ok(()),
            // Encoding failed before anything reached the write buffer.
            Err(e @ CodecError::FrameTooLarge { .. }) => Err(TransportError::NotSent(e)),
            Err(e) => Err(e.into()),
        }
    }

    async fn recv(&mut self) -> TransportResult<DeviceEvent> {
        let framed = self.framed.as_mut().ok_or(TransportError::Closed)?;

        match framed.next().await {
            Some(Ok(event)) => {
                trace!("Received {} from {}", event.name(), self.connector.describe());
                Ok(event)
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                debug!("{} closed the link", self.connector.describe());
                Err(TransportError::Closed)
            }
        }
    }

    fn describe(&self) -> String {
        self.connector.describe()
    }
}
