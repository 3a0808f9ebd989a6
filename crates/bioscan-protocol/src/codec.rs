//! Tokio codec for the device link.
//!
//! Frames carry one JSON-encoded message each:
//!
//! ```text
//! +-----+-------------+-------------+----------+-----+
//! | STX | length (BE) | JSON body   | checksum | ETX |
//! | 02  | u32         | length bytes| u8 (XOR) | 03  |
//! +-----+-------------+-------------+----------+-----+
//! ```
//!
//! The checksum is the XOR of every body byte. Bytes received before an STX
//! are discarded, so a reader can join a stream mid-frame and resynchronise
//! on the next frame start.
//!
//! [`LinkCodec`] is parameterised on the message type it writes and the one
//! it reads. The client side uses `LinkCodec<Command, DeviceEvent>` and a
//! bridge or simulator uses the mirror image.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use bioscan_protocol::{Command, DeviceEvent, LinkCodec};
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:7001").await?;
//! let mut framed = Framed::new(stream, LinkCodec::<Command, DeviceEvent>::new());
//!
//! framed.send(Command::GetBatteryPercentage).await?;
//! if let Some(Ok(event)) = framed.next().await {
//!     println!("Received: {event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Start of frame marker.
pub const STX: u8 = 0x02;

/// End of frame marker.
pub const ETX: u8 = 0x03;

/// STX plus the length prefix.
pub const HEADER_LEN: usize = 5;

/// Checksum plus ETX.
pub const TRAILER_LEN: usize = 2;

/// Default maximum frame size in bytes (16 MiB).
///
/// Binary fields travel base64 encoded, so this holds a four-finger last
/// frame with its raw data, or a firmware image of up to about 12 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while framing or unframing link messages.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Frame not terminated by ETX")]
    MissingEtx,

    #[error("Invalid message body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// XOR of every byte in `body`.
#[must_use]
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, byte| acc ^ byte)
}

/// Length-prefixed JSON codec writing `Out` and reading `In`.
pub struct LinkCodec<Out, In> {
    max_frame_size: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<Out, In> LinkCodec<Out, In> {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            _marker: PhantomData,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<Out, In> Default for LinkCodec<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> Clone for LinkCodec<Out, In> {
    fn clone(&self) -> Self {
        Self::with_max_frame_size(self.max_frame_size)
    }
}

impl<Out, In> fmt::Debug for LinkCodec<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCodec")
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

impl<Out, In: DeserializeOwned> Decoder for LinkCodec<Out, In> {
    type Item = In;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, CodecError> {
        let Some(start) = src.iter().position(|&byte| byte == STX) else {
            src.clear();
            return Ok(None);
        };
        src.advance(start);

        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let body_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        let frame_len = body_len
            .checked_add(HEADER_LEN + TRAILER_LEN)
            .filter(|&len| len <= self.max_frame_size);

        let Some(frame_len) = frame_len else {
            // Drop this STX so the next call resynchronises past it.
            src.advance(1);
            return Err(CodecError::FrameTooLarge {
                size: body_len.saturating_add(HEADER_LEN + TRAILER_LEN),
                max_size: self.max_frame_size,
            });
        };

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_LEN);
        let body = frame.split_to(body_len);
        let actual = frame[0];

        if frame[1] != ETX {
            return Err(CodecError::MissingEtx);
        }

        let expected = checksum(&body);
        if expected != actual {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        Ok(Some(serde_json::from_slice(&body)?))
    }
}

impl<Out: Serialize, In> Encoder<Out> for LinkCodec<Out, In> {
    type Error = CodecError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = serde_json::to_vec(&item)?;
        let frame_len = HEADER_LEN + body.len() + TRAILER_LEN;

        if frame_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: frame_len,
                max_size: self.max_frame_size,
            });
        }

        let body_len = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
            size: frame_len,
            max_size: self.max_frame_size,
        })?;

        dst.reserve(frame_len);
        dst.put_u8(STX);
        dst.put_u32(body_len);
        dst.extend_from_slice(&body);
        dst.put_u8(checksum(&body));
        dst.put_u8(ETX);

        Ok(())
    }
}
