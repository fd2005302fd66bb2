use crate::error::Error;
use crate::severity::Severity;

use std::collections::HashMap;
use std::sync::Arc;

/// The payload of a [`LogEntry`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Ends up in the `textPayload` field
    Text(String),
    /// Ends up in the `jsonPayload` field
    Json(serde_json::Map<String, serde_json::Value>),
}

/// What a [`Hook`](crate::hook::Hook) hands to the remote client for every entry it fires.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    pub payload: Payload,
    pub labels: HashMap<String, String>,
}

/// A client that delivers log entries to a logging backend.
///
/// Implementations buffer and deliver on their own terms. They must be safe to call from
/// several threads at once.
pub trait LogClient {
    /// Queues an entry for delivery.
    ///
    /// # Errors
    ///
    /// Only when the entry could not be queued at all. Delivery failures happen later and are
    /// the client's own concern.
    fn log(&self, entry: LogEntry) -> Result<(), Error>;

    /// Blocks until the entries queued so far have been delivered, or until the client gives up.
    fn flush(&self);
}

impl<C: LogClient + ?Sized> LogClient for Arc<C> {
    fn log(&self, entry: LogEntry) -> Result<(), Error> {
        (**self).log(entry)
    }

    fn flush(&self) {
        (**self).flush()
    }
}
