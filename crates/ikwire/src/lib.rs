//! Named events over persistent TCP connections.
//!
//! A peer sends an event name with an opaque payload; the remote side runs
//! the handler registered for that name and answers under the same name.
//! Servers can also push an unbounded sequence of frames to a subscribed
//! client, and clients can upload a byte source as a stream of chunks.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP listener and stream wrappers
//! - [`frame`] — wire codec and buffered connection I/O
//! - [`peer`] — handler registry, server and client (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use ikwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ikwire_frame::*;
}

/// Re-export server and client types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use ikwire_peer::*;
}
