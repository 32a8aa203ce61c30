/// Errors that can occur in server and client operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (bind, connect, accept).
    #[error("transport error: {0}")]
    Transport(#[from] ikwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ikwire_frame::FrameError),

    /// The client was closed explicitly; call `connect` to reopen it.
    #[error("client is not connected")]
    NotConnected,

    /// The server answered with an error frame.
    #[error("server rejected event '{event}': {message}")]
    Remote { event: String, message: String },

    /// The reply arrived under a different event than the request.
    #[error("expected reply for event '{expected}', got '{found}'")]
    UnexpectedEvent { expected: String, found: String },

    /// The event name is reserved for protocol use.
    #[error("event name '{0}' is reserved")]
    ReservedEvent(String),

    /// A subscription is already running on this client.
    #[error("client already has an active subscription to '{0}'")]
    AlreadySubscribed(String),

    /// Request/response calls are not allowed while a subscription owns the connection.
    #[error("connection is owned by the active subscription to '{0}'")]
    SubscriptionActive(String),

    /// The subscription reader thread panicked.
    #[error("subscription reader for '{0}' panicked")]
    SubscriptionPanicked(String),

    /// Reading from a stream source failed.
    #[error("stream source read failed: {0}")]
    Source(#[source] std::io::Error),

    /// Spawning a worker thread failed.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A socket read or write timed out.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A frame from the server broke the local limits and could not be read.
    #[error("invalid frame from server: {0}")]
    InvalidReply(#[source] ikwire_frame::FrameError),
}

impl PeerError {
    /// True when the connection the error happened on can no longer be
    /// trusted to carry correlated request/response pairs.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            PeerError::Frame(err) => !err.is_rejection(),
            PeerError::Transport(_)
            | PeerError::UnexpectedEvent { .. }
            | PeerError::Timeout(_)
            | PeerError::InvalidReply(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
