use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::PeerError;

/// Payload of an `$error` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    /// Event the failed request was sent under.
    pub event: String,
    /// Human-readable failure description.
    pub error: String,
}

impl RemoteError {
    pub fn new(event: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            error: error.into(),
        }
    }

    /// Error for an event with no registered handler.
    pub fn not_registered(event: &str) -> Self {
        Self::new(event, format!("event '{event}' not registered"))
    }

    /// JSON wire form.
    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(self)
            .unwrap_or_else(|_| b"{\"event\":\"\",\"error\":\"dispatch failed\"}".to_vec())
    }

    /// Parse an `$error` payload. Non-JSON payloads are kept as lossy text.
    pub fn from_payload(requested: &str, payload: &Bytes) -> Self {
        serde_json::from_slice(payload).unwrap_or_else(|_| {
            Self::new(requested, String::from_utf8_lossy(payload).into_owned())
        })
    }
}

impl From<RemoteError> for PeerError {
    fn from(err: RemoteError) -> Self {
        PeerError::Remote {
            event: err.event,
            message: err.error,
        }
    }
}
