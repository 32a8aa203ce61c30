//! Versioned event framing for ikwire.
//!
//! Every message in both directions is one frame:
//! - A 1-byte protocol version, checked before anything else is parsed
//! - A 1-byte event name length followed by the UTF-8 event name
//! - A 4-byte little-endian payload length
//! - The opaque payload
//!
//! [`FrameReader`]/[`FrameWriter`] buffer a byte stream so callers only ever
//! see whole frames, and [`Connection`] pairs them over one TCP socket.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod connection;
pub mod error;
pub mod events;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::EventCodec;
pub use codec::{
    decode_frame, decode_header, encode_frame, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_PAYLOAD, FIXED_HEADER_SIZE, MAX_EVENT_LEN, MAX_PAYLOAD_LEN, PROTOCOL_VERSION,
};
pub use connection::Connection;
pub use error::{FrameError, Result};
pub use events::{is_reserved, validate_event_name, ERROR_EVENT, RESERVED_PREFIX};
pub use reader::FrameReader;
pub use writer::FrameWriter;
