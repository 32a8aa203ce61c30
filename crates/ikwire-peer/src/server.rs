use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use ikwire_frame::{Connection, FrameConfig, FrameError, FrameReader, FrameWriter, ERROR_EVENT};
use ikwire_transport::{TcpConn, TcpTransport};
use tracing::{debug, trace, warn};

use crate::error::{PeerError, Result};
use crate::registry::Registry;
use crate::remote::RemoteError;

/// Server behavior configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Framing limits, version and per-connection socket timeouts.
    pub frame: FrameConfig,
    /// Disable Nagle's algorithm on accepted sockets.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            nodelay: true,
        }
    }
}

/// The handler's view of the connection that sent the current event.
///
/// Owned by the connection's thread; handlers may push any number of frames
/// through [`ServerClient::send`] before returning.
pub struct ServerClient {
    id: String,
    peer_addr: SocketAddr,
    writer: FrameWriter<TcpConn>,
}

impl ServerClient {
    /// Server-assigned identifier (`client-N`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote address of the client socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send one frame to this client.
    pub fn send(&mut self, event: &str, payload: &[u8]) -> Result<()> {
        self.writer.send(event, payload)?;
        Ok(())
    }

    fn send_error(&mut self, err: &RemoteError) -> Result<()> {
        self.writer.send(ERROR_EVENT, &err.to_payload())?;
        Ok(())
    }
}

impl std::fmt::Debug for ServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerClient")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Accepts connections and dispatches their events to registered handlers.
///
/// Each connection is served by its own thread: events on one connection are
/// handled strictly in order, different connections run in parallel and
/// share nothing but the registry. An event with no handler is answered with
/// an `$error` frame and the connection keeps going.
#[derive(Clone, Default)]
pub struct Server {
    registry: Arc<Registry>,
    config: ServerConfig,
    next_client_id: Arc<AtomicU64>,
}

impl Server {
    /// Create a server with an empty registry and default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server with explicit config.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Serve handlers from an existing registry.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Bind `handler` to `event`; see [`Registry::register`].
    pub fn register<F>(&self, event: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut ServerClient, Bytes) -> Option<Bytes> + Send + Sync + 'static,
    {
        self.registry.register(event, handler)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind `addr` and serve until accepting fails.
    pub fn listen(&self, addr: &str) -> Result<()> {
        let listener = TcpTransport::bind(addr)?;
        self.serve(listener)
    }

    /// Accept connections from `listener` until accepting fails, spawning one
    /// thread per connection.
    pub fn serve(&self, listener: TcpTransport) -> Result<()> {
        debug!(
            addr = %listener.local_addr(),
            events = ?self.registry.events(),
            "serving"
        );
        loop {
            let stream = listener.accept()?;
            let id = self.next_client_id();
            let server = self.clone();
            let spawned = thread::Builder::new()
                .name(format!("ikwire-conn-{}", id.trim_start_matches("client-")))
                .spawn(move || server.run_connection(stream, id));
            if let Err(err) = spawned {
                warn!(error = %err, "failed to spawn connection thread; dropping connection");
            }
        }
    }

    /// Run the dispatch loop for one connection on the calling thread.
    ///
    /// Returns `Ok(())` when the client disconnects cleanly between frames.
    pub fn handle_connection(&self, stream: TcpConn) -> Result<()> {
        let id = self.next_client_id();
        self.handle_connection_with_id(stream, &id)
    }

    fn next_client_id(&self) -> String {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("client-{id}")
    }

    fn run_connection(&self, stream: TcpConn, id: String) {
        match self.handle_connection_with_id(stream, &id) {
            Ok(()) => debug!(client = %id, "client disconnected"),
            Err(err) => warn!(client = %id, error = %err, "connection closed on error"),
        }
    }

    fn handle_connection_with_id(&self, stream: TcpConn, id: &str) -> Result<()> {
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        let conn = Connection::new(stream, self.config.frame.clone())?;
        let peer_addr = conn.peer_addr();
        let (mut reader, writer) = conn.into_split();
        let mut client = ServerClient {
            id: id.to_string(),
            peer_addr,
            writer,
        };
        debug!(client = id, %peer_addr, "client connected");

        self.dispatch(&mut reader, &mut client)
    }

    fn dispatch(&self, reader: &mut FrameReader<TcpConn>, client: &mut ServerClient) -> Result<()> {
        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => return Ok(()),
                Err(err) => return Err(err.into()),
            };

            let Some(handler) = self.registry.lookup(&frame.event) else {
                warn!(client = %client.id, event = %frame.event, "event not registered");
                client.send_error(&RemoteError::not_registered(&frame.event))?;
                continue;
            };

            trace!(
                client = %client.id,
                event = %frame.event,
                size = frame.payload.len(),
                "dispatching event"
            );

            let event = frame.event;
            let Some(reply) = handler(client, frame.payload) else {
                continue;
            };

            match client.send(&event, &reply) {
                Ok(()) => {}
                Err(PeerError::Frame(err)) if err.is_rejection() => {
                    warn!(client = %client.id, event = %event, error = %err, "handler reply rejected");
                    client.send_error(&RemoteError::new(&event, format!("reply rejected: {err}")))?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
