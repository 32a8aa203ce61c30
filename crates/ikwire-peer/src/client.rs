use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use ikwire_frame::{is_reserved, Connection, Frame, FrameConfig, FrameError, ERROR_EVENT};
use ikwire_transport::{TcpConn, TcpTransport};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};
use crate::remote::RemoteError;

/// Address used when none is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:48923";

/// Default chunk size for [`Client::stream`].
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client behavior configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Framing limits, version and socket timeouts.
    pub frame: FrameConfig,
    /// Upper bound on dialing; `None` blocks until the OS gives up.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            nodelay: true,
        }
    }
}

impl ClientConfig {
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame.write_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }
}

/// Options for [`Client::stream_with`].
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Bytes read from the source per frame.
    pub chunk_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What a finished stream sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: u64,
}

/// One dialed socket. `conn` doubles as the exchange lock; `control` is a
/// second handle used to shut the socket down while `conn` is held.
struct Link {
    conn: Mutex<Connection>,
    control: TcpConn,
}

impl Link {
    fn shutdown(&self) {
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "socket shutdown failed");
        }
    }
}

struct Subscription {
    event: String,
    cancel: Arc<AtomicBool>,
    link: Arc<Link>,
    handle: JoinHandle<Result<()>>,
}

/// Blocking event client over one persistent TCP connection.
///
/// The connection is dialed lazily on first use and cached. Calls from any
/// number of threads are safe: each request holds the connection until its
/// reply has been read, so replies are never delivered to the wrong caller.
/// A failure that leaves the connection in an unknown state drops it and the
/// next call dials again. After [`Client::close`] every call fails with
/// [`PeerError::NotConnected`] until [`Client::connect`] is called.
pub struct Client {
    addr: String,
    config: ClientConfig,
    link: Mutex<Option<Arc<Link>>>,
    subscription: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

impl Client {
    /// Create a client for `addr` with default config. Does not dial.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            link: Mutex::new(None),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True when a connection is currently cached.
    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Dial now instead of on first use. Also re-opens a closed client.
    pub fn connect(&self) -> Result<()> {
        self.closed.store(false, Ordering::Release);
        self.link().map(|_| ())
    }

    /// Send one event and wait for its reply.
    ///
    /// A `$error` reply becomes [`PeerError::Remote`]; a reply under any
    /// other event name is [`PeerError::UnexpectedEvent`].
    pub fn send(&self, event: &str, payload: &[u8]) -> Result<Bytes> {
        reject_reserved(event)?;

        self.check_no_subscription()?;
        let link = self.link()?;

        // Re-checked after dialing so the subscription lock is never held
        // across a connect.
        let subscription = lock(&self.subscription);
        if let Some(active) = subscription.as_ref() {
            return Err(PeerError::SubscriptionActive(active.event.clone()));
        }
        let mut conn = lock(&link.conn);
        drop(subscription);

        let result = self.exchange(&mut conn, event, payload);
        drop(conn);
        self.settle(&link, result)
    }

    /// Send one event, then hand every frame the server pushes back to
    /// `on_frame` from a background thread until [`Client::unsubscribe`] or
    /// [`Client::close`].
    ///
    /// While the subscription is active it is the only reader of the
    /// connection: [`Client::send`] and [`Client::stream`] fail with
    /// [`PeerError::SubscriptionActive`].
    ///
    /// `on_frame` may call [`Client::unsubscribe`] or [`Client::close`]; the
    /// reader then stops once the callback returns instead of being joined.
    pub fn subscribe<F>(&self, event: &str, payload: &[u8], on_frame: F) -> Result<()>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        reject_reserved(event)?;

        if let Some(active) = lock(&self.subscription).as_ref() {
            return Err(PeerError::AlreadySubscribed(active.event.clone()));
        }
        let link = self.link()?;

        let mut subscription = lock(&self.subscription);
        if let Some(active) = subscription.as_ref() {
            return Err(PeerError::AlreadySubscribed(active.event.clone()));
        }
        let sent = lock(&link.conn)
            .send_frame(event, payload)
            .map_err(|err| self.frame_error(err));
        self.settle(&link, sent)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let reader_link = Arc::clone(&link);
        let reader_cancel = Arc::clone(&cancel);
        let reader_event = event.to_string();
        let handle = thread::Builder::new()
            .name("ikwire-subscription".to_string())
            .spawn(move || {
                let result = read_pushes(&reader_link, &reader_event, &reader_cancel, on_frame);
                if let Err(err) = &result {
                    warn!(event = %reader_event, error = %err, "subscription ended");
                }
                result
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                self.drop_link(&link);
                return Err(PeerError::Spawn(err));
            }
        };

        debug!(event, "subscribed");
        *subscription = Some(Subscription {
            event: event.to_string(),
            cancel,
            link,
            handle,
        });
        Ok(())
    }

    /// Stop the active subscription and wait for its reader to exit.
    ///
    /// Returns the reader's failure, if it had one. The connection the
    /// subscription used is dropped since pushes may still be in flight on
    /// it. Without an active subscription this is a no-op.
    pub fn unsubscribe(&self) -> Result<()> {
        let Some(subscription) = lock(&self.subscription).take() else {
            return Ok(());
        };

        subscription.cancel.store(true, Ordering::Release);
        subscription.link.shutdown();

        // Called from `on_frame`: the reader exits after the callback returns.
        if subscription.handle.thread().id() == thread::current().id() {
            self.drop_link(&subscription.link);
            debug!(event = %subscription.event, "unsubscribed from subscription callback");
            return Ok(());
        }

        let result = subscription
            .handle
            .join()
            .unwrap_or_else(|_| Err(PeerError::SubscriptionPanicked(subscription.event.clone())));
        self.drop_link(&subscription.link);
        debug!(event = %subscription.event, "unsubscribed");
        result
    }

    /// True from a successful [`Client::subscribe`] until
    /// [`Client::unsubscribe`] or [`Client::close`], even if the reader has
    /// already stopped on an error.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    /// Upload `source` in [`DEFAULT_CHUNK_SIZE`] chunks under `event`.
    pub fn stream<R: Read>(&self, event: &str, source: R) -> Result<StreamSummary> {
        self.stream_with(event, source, StreamOptions::default(), |_| {})
    }

    /// Upload `source` as a sequence of `event` frames, passing each chunk's
    /// reply to `on_reply`.
    ///
    /// Each chunk is filled until it is full or the source reports end of
    /// data; the first short chunk is the last one sent. An empty source
    /// sends nothing.
    pub fn stream_with<R, F>(
        &self,
        event: &str,
        mut source: R,
        options: StreamOptions,
        mut on_reply: F,
    ) -> Result<StreamSummary>
    where
        R: Read,
        F: FnMut(Bytes),
    {
        let chunk_size = options.chunk_size.max(1);
        let mut chunk = vec![0u8; chunk_size];
        let mut summary = StreamSummary::default();

        loop {
            let filled = fill_chunk(&mut source, &mut chunk).map_err(PeerError::Source)?;
            if filled == 0 {
                break;
            }

            let reply = self.send(event, &chunk[..filled])?;
            on_reply(reply);
            summary.chunks += 1;
            summary.bytes += filled as u64;

            if filled < chunk_size {
                break;
            }
        }

        debug!(event, chunks = summary.chunks, bytes = summary.bytes, "stream finished");
        Ok(summary)
    }

    /// Stop any subscription and drop the connection.
    ///
    /// Returns the subscription reader's failure, if any. Later calls fail
    /// with [`PeerError::NotConnected`] until [`Client::connect`].
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let result = self.unsubscribe();
        if let Some(link) = lock(&self.link).take() {
            link.shutdown();
            debug!(addr = %self.addr, "connection closed");
        }
        result
    }

    fn check_no_subscription(&self) -> Result<()> {
        match lock(&self.subscription).as_ref() {
            Some(active) => Err(PeerError::SubscriptionActive(active.event.clone())),
            None => Ok(()),
        }
    }

    fn link(&self) -> Result<Arc<Link>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PeerError::NotConnected);
        }

        if let Some(link) = lock(&self.link).as_ref() {
            return Ok(Arc::clone(link));
        }

        // Dial without holding the slot; a concurrent dial or `close` may
        // have won in the meantime.
        let dialed = Arc::new(self.dial()?);
        let mut slot = lock(&self.link);
        if self.closed.load(Ordering::Acquire) {
            dialed.shutdown();
            return Err(PeerError::NotConnected);
        }
        if let Some(link) = slot.as_ref() {
            dialed.shutdown();
            return Ok(Arc::clone(link));
        }
        *slot = Some(Arc::clone(&dialed));
        Ok(dialed)
    }

    fn dial(&self) -> Result<Link> {
        let stream = match self.config.connect_timeout {
            Some(timeout) => TcpTransport::connect_timeout(&self.addr, timeout)?,
            None => TcpTransport::connect(&self.addr)?,
        };
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        let conn = Connection::new(stream, self.config.frame.clone())?;
        let control = conn.shutdown_handle()?;
        debug!(addr = %self.addr, local = ?control.local_addr().ok(), "connected");

        Ok(Link {
            conn: Mutex::new(conn),
            control,
        })
    }

    fn exchange(&self, conn: &mut Connection, event: &str, payload: &[u8]) -> Result<Bytes> {
        conn.send_frame(event, payload)
            .map_err(|err| self.frame_error(err))?;
        let reply = conn.receive_frame().map_err(|err| self.receive_error(err))?;

        if reply.event == ERROR_EVENT {
            return Err(RemoteError::from_payload(event, &reply.payload).into());
        }
        if reply.event != event {
            return Err(PeerError::UnexpectedEvent {
                expected: event.to_string(),
                found: reply.event,
            });
        }
        Ok(reply.payload)
    }

    /// Drop `link` if `result` says it can no longer be trusted.
    fn settle<T>(&self, link: &Arc<Link>, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_connection_fatal() {
                debug!(addr = %self.addr, error = %err, "dropping connection");
                self.drop_link(link);
            }
        }
        result
    }

    fn drop_link(&self, link: &Arc<Link>) {
        let mut slot = lock(&self.link);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, link)) {
            *slot = None;
        }
        drop(slot);
        link.shutdown();
    }

    /// Limit errors on the read side leave the offending header buffered, so
    /// unlike send-side rejections they poison the connection.
    fn receive_error(&self, err: FrameError) -> PeerError {
        match err {
            FrameError::PayloadTooLarge { .. }
            | FrameError::EventNameTooLong { .. }
            | FrameError::InvalidEventName => PeerError::InvalidReply(err),
            other => self.frame_error(other),
        }
    }

    fn frame_error(&self, err: FrameError) -> PeerError {
        if err.is_timeout() {
            let frame = &self.config.frame;
            let after = frame.read_timeout.or(frame.write_timeout).unwrap_or_default();
            return PeerError::Timeout(after);
        }
        PeerError::Frame(err)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(addr = %self.addr, error = %err, "close on drop reported an error");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

fn read_pushes<F>(link: &Link, event: &str, cancel: &AtomicBool, mut on_frame: F) -> Result<()>
where
    F: FnMut(Frame),
{
    let mut conn = lock(&link.conn);
    while !cancel.load(Ordering::Acquire) {
        match conn.receive_frame() {
            Ok(frame) if frame.event == ERROR_EVENT => {
                return Err(RemoteError::from_payload(event, &frame.payload).into());
            }
            Ok(frame) => on_frame(frame),
            Err(err) if err.is_timeout() => continue,
            // Shutdown from `unsubscribe` surfaces as EOF or a reset.
            Err(_) if cancel.load(Ordering::Acquire) => break,
            Err(err) if err.is_rejection() => return Err(PeerError::InvalidReply(err)),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Read until `chunk` is full or `source` is exhausted.
fn fill_chunk<R: Read>(source: &mut R, chunk: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        match source.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn reject_reserved(event: &str) -> Result<()> {
    if is_reserved(event) {
        return Err(PeerError::ReservedEvent(event.to_string()));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
