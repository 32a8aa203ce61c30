use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::events::validate_event_name;

/// Protocol revision carried in the first byte of every frame.
pub const PROTOCOL_VERSION: u8 = 2;

/// Fixed part of the header: version (1) + name length (1) + payload length (4).
pub const FIXED_HEADER_SIZE: usize = 6;

/// Longest event name the 1-byte length prefix can describe.
pub const MAX_EVENT_LEN: usize = u8::MAX as usize;

/// Largest payload the protocol allows: 2 GiB - 1.
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize;

/// Default maximum payload size accepted by readers and writers.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_PAYLOAD_LEN;

/// A framed event message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The event this message is addressed to (or replies to).
    pub event: String,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(event: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            event: event.into(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        FIXED_HEADER_SIZE + self.event.len() + self.payload.len()
    }
}

/// Decoded frame header, everything before the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub event: String,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Number of wire bytes the header occupies.
    pub fn header_len(&self) -> usize {
        FIXED_HEADER_SIZE + self.event.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (integers little-endian):
/// ```text
/// ┌─────────┬──────────┬──────────────┬─────────────┬──────────────────┐
/// │ Version │ Name len │ Event name   │ Payload len │ Payload          │
/// │ (1B)    │ (1B)     │ (len bytes)  │ (4B LE)     │ (len bytes)      │
/// └─────────┴──────────┴──────────────┴─────────────┴──────────────────┘
/// ```
///
/// Nothing is written to `dst` when the name or payload is rejected.
pub fn encode_frame(version: u8, event: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    validate_event_name(event)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    dst.reserve(FIXED_HEADER_SIZE + event.len() + payload.len());
    dst.put_u8(version);
    dst.put_u8(event.len() as u8);
    dst.put_slice(event.as_bytes());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame header from the front of a buffer without consuming it.
///
/// The version byte is checked as soon as it is available, so a foreign or
/// outdated peer is rejected before anything else is parsed. Returns
/// `Ok(None)` if the buffer doesn't hold a complete header yet.
pub fn decode_header(src: &[u8], version: u8, max_payload: usize) -> Result<Option<FrameHeader>> {
    let Some(&found) = src.first() else {
        return Ok(None);
    };
    if found != version {
        return Err(FrameError::VersionMismatch {
            expected: version,
            found,
        });
    }

    if src.len() < 2 {
        return Ok(None);
    }
    let name_len = src[1] as usize;
    let header_len = FIXED_HEADER_SIZE + name_len;
    if src.len() < header_len {
        return Ok(None);
    }

    let event = std::str::from_utf8(&src[2..2 + name_len])
        .map_err(|_| FrameError::InvalidEventName)?
        .to_string();

    let mut len_field = &src[2 + name_len..header_len];
    let payload_len = len_field.get_u32_le() as usize;

    let max = max_payload.min(MAX_PAYLOAD_LEN);
    if payload_len > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max,
        });
    }

    Ok(Some(FrameHeader {
        version: found,
        event,
        payload_len,
    }))
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer; on `Ok(None)` the
/// buffer is untouched, so decoding can resume once more bytes arrive.
pub fn decode_frame(src: &mut BytesMut, version: u8, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = decode_header(src, version, max_payload)? else {
        return Ok(None);
    };

    let total = header.header_len() + header.payload_len;
    // No reservation for the declared length: the buffer grows only with
    // bytes that actually arrive.
    if src.len() < total {
        return Ok(None);
    }

    src.advance(header.header_len());
    let payload = src.split_to(header.payload_len).freeze();

    Ok(Some(Frame {
        event: header.event,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Protocol version written to and required on every frame.
    pub version: u8,
    /// Maximum payload size in bytes. Default: 2 GiB - 1.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
