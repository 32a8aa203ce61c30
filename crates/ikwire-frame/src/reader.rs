use std::io::{ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};
use ikwire_transport::TcpConn;

use crate::codec::{decode_frame, decode_header, Frame, FrameConfig, FrameHeader};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Bytes are only consumed once the whole frame is buffered, so a read
    /// that fails with a socket timeout can simply be retried.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached between
    /// frames and `Err(FrameError::UnexpectedEof)` when it cuts a frame short.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(
                &mut self.buf,
                self.config.version,
                self.config.max_payload_size,
            )? {
                return Ok(frame);
            }
            self.fill(false)?;
        }
    }

    /// Read and consume exactly one frame header (blocking).
    ///
    /// Must be followed by [`FrameReader::read_payload`] with the returned
    /// `payload_len` before the next header is read.
    pub fn read_header(&mut self) -> Result<FrameHeader> {
        loop {
            if let Some(header) = decode_header(
                &self.buf,
                self.config.version,
                self.config.max_payload_size,
            )? {
                self.buf.advance(header.header_len());
                return Ok(header);
            }
            self.fill(false)?;
        }
    }

    /// Read exactly `len` payload bytes following a header (blocking).
    pub fn read_payload(&mut self, len: usize) -> Result<Bytes> {
        while self.buf.len() < len {
            self.fill(true)?;
        }
        Ok(self.buf.split_to(len).freeze())
    }

    fn fill(&mut self, mid_frame: bool) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if mid_frame || !self.buf.is_empty() {
                    return Err(FrameError::UnexpectedEof {
                        buffered: self.buf.len(),
                    });
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
            return Ok(());
        }
    }

    /// Number of bytes read from the stream but not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TcpConn> {
    /// Create a frame reader for a `TcpConn` and apply read timeout from config.
    pub fn with_config_tcp(inner: TcpConn, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: ikwire_transport::TransportError) -> FrameError {
    match err {
        ikwire_transport::TransportError::Io(io)
        | ikwire_transport::TransportError::Accept(io) => FrameError::Io(io),
        ikwire_transport::TransportError::Bind { source, .. }
        | ikwire_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
