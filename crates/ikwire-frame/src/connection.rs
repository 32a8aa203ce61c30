use std::net::SocketAddr;

use ikwire_transport::TcpConn;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::error::Result;
use crate::reader::{transport_to_frame_error, FrameReader};
use crate::writer::FrameWriter;

/// One socket with an input buffer and an output buffer.
///
/// `send_frame` returns only after the frame is flushed to the socket;
/// `receive_frame` blocks until a whole frame has arrived. Callers sharing a
/// connection across threads must serialize access themselves.
pub struct Connection {
    reader: FrameReader<TcpConn>,
    writer: FrameWriter<TcpConn>,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wrap a connected stream, applying timeouts from `config`.
    pub fn new(stream: TcpConn, config: FrameConfig) -> Result<Self> {
        let peer_addr = stream.peer_addr().map_err(transport_to_frame_error)?;
        let reader_stream = stream.try_clone().map_err(transport_to_frame_error)?;

        let reader = FrameReader::with_config_tcp(reader_stream, config.clone())?;
        let writer = FrameWriter::with_config_tcp(stream, config)?;
        debug!(%peer_addr, "connection ready");

        Ok(Self {
            reader,
            writer,
            peer_addr,
        })
    }

    /// Encode, write and flush one frame.
    pub fn send_frame(&mut self, event: &str, payload: &[u8]) -> Result<()> {
        self.writer.send(event, payload)
    }

    /// Block until one complete frame is received.
    pub fn receive_frame(&mut self) -> Result<Frame> {
        self.reader.read_frame()
    }

    /// Remote address of the socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Clone a handle that can shut the socket down from another thread.
    pub fn shutdown_handle(&self) -> Result<TcpConn> {
        self.writer
            .get_ref()
            .try_clone()
            .map_err(transport_to_frame_error)
    }

    /// Shut down both directions of the socket.
    pub fn shutdown(&self) -> Result<()> {
        self.writer
            .get_ref()
            .shutdown()
            .map_err(transport_to_frame_error)
    }

    /// Split into independently owned reader and writer halves.
    pub fn into_split(self) -> (FrameReader<TcpConn>, FrameWriter<TcpConn>) {
        (self.reader, self.writer)
    }

    /// Current frame configuration.
    pub fn config(&self) -> &FrameConfig {
        self.writer.config()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("buffered", &self.reader.buffered())
            .finish()
    }
}
