use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use ikwire_frame::{is_reserved, validate_event_name};
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::server::ServerClient;

/// Server-side handler bound to an event name.
///
/// Receives the calling client and the request payload. `Some(reply)` is sent
/// back under the request's event name; `None` sends nothing, which is how
/// push-style handlers end after streaming frames through
/// [`ServerClient::send`].
pub type Handler = Arc<dyn Fn(&mut ServerClient, Bytes) -> Option<Bytes> + Send + Sync>;

/// Event-name-keyed handler table.
///
/// Lookups take a shared lock, so connection threads never block each other;
/// registration takes the write lock and may happen while serving.
#[derive(Default)]
pub struct Registry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `event`, replacing any previous handler.
    ///
    /// Names are case-sensitive. Fails only when the name cannot be sent on
    /// the wire or is reserved.
    pub fn register<F>(&self, event: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut ServerClient, Bytes) -> Option<Bytes> + Send + Sync + 'static,
    {
        validate_event_name(event)?;
        if is_reserved(event) {
            return Err(PeerError::ReservedEvent(event.to_string()));
        }

        let previous = self.write().insert(event.to_string(), Arc::new(handler));
        if previous.is_some() {
            debug!(event, "replaced event handler");
        } else {
            debug!(event, "registered event handler");
        }
        Ok(())
    }

    /// Remove the handler for `event`. Returns whether one was registered.
    pub fn unregister(&self, event: &str) -> bool {
        self.write().remove(event).is_some()
    }

    /// Handler currently bound to `event`, if any.
    pub fn lookup(&self, event: &str) -> Option<Handler> {
        self.read().get(event).cloned()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.read().contains_key(event)
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.read().keys().cloned().collect();
        events.sort();
        events
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Handler>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Handler>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("events", &self.events())
            .finish()
    }
}
