//! Reserved event names.
//!
//! Names starting with `$` belong to the protocol itself. Applications
//! register and send everything else.

use crate::codec::MAX_EVENT_LEN;
use crate::error::{FrameError, Result};

/// Prefix shared by all reserved event names.
pub const RESERVED_PREFIX: char = '$';

/// Event a server replies under when dispatch fails.
///
/// The payload is JSON: `{"event": "<requested>", "error": "<message>"}`.
pub const ERROR_EVENT: &str = "$error";

/// Returns true if the event name is reserved for protocol use.
pub fn is_reserved(event: &str) -> bool {
    event.starts_with(RESERVED_PREFIX)
}

/// Check that an event name fits the wire format.
pub fn validate_event_name(event: &str) -> Result<()> {
    if event.len() > MAX_EVENT_LEN {
        return Err(FrameError::EventNameTooLong {
            len: event.len(),
            max: MAX_EVENT_LEN,
        });
    }
    Ok(())
}
