//! TCP transport for ikwire.
//!
//! This is the lowest layer of ikwire: a listener that binds and accepts,
//! and a connected [`TcpConn`] stream that everything above frames over.
//! Nothing here knows about events or frames.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::TcpConn;
pub use tcp::TcpTransport;
