//! Messages exchanged with a biometric capture device and their wire framing.
//!
//! [`Command`] is what the client asks for, [`DeviceEvent`] is everything the
//! device reports back. [`LinkCodec`] frames either direction for transports
//! that carry the link over a byte stream.

pub mod base64_bytes;
pub mod codec;
pub mod command;
pub mod event;

pub use codec::{CodecError, DEFAULT_MAX_FRAME_SIZE, LinkCodec, checksum};
pub use command::Command;
pub use event::{DeviceEvent, FrameImage, Rejection};
