//! Event-level endpoints over framed TCP connections.
//!
//! The server side is a [`Registry`] of handlers keyed by event name and a
//! [`Server`] that runs one dispatch loop per connection. The client side is
//! [`Client`]: request/response with [`Client::send`], server push with
//! [`Client::subscribe`] and chunked upload with [`Client::stream`].

pub mod client;
pub mod error;
pub mod registry;
pub mod remote;
pub mod server;

pub use client::{
    Client, ClientConfig, StreamOptions, StreamSummary, DEFAULT_ADDR, DEFAULT_CHUNK_SIZE,
};
pub use error::{PeerError, Result};
pub use registry::{Handler, Registry};
pub use remote::RemoteError;
pub use server::{Server, ServerClient, ServerConfig};
