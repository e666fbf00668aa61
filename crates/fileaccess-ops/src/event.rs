//! Event emitter bridge between the transfer engine and the host.
//!
//! The host supplies one or more [`EventSink`]s; the engine only ever sees an
//! object accepting `(event name, payload)`. Events for a single transfer are
//! emitted from that transfer's task in order, and every sink receives them
//! synchronously in that same order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use fileaccess_core::ErrorKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::registry::TransferHandle;

/// Name of the per-chunk progress event.
pub const PROGRESS_EVENT: &str = "FileAccess.progress";
/// Name of the terminal success event.
pub const COMPLETE_EVENT: &str = "FileAccess.complete";
/// Name of the terminal failure/cancellation event.
pub const ERROR_EVENT: &str = "FileAccess.error";

/// Receiver of named events.
///
/// Implementations must not block for long: they are called on the
/// transfer's own task.
pub trait EventSink: Send + Sync {
    fn emit(&self, name: &str, payload: &Value);

    /// Emit a typed transfer event.
    fn emit_event(&self, event: &TransferEvent) {
        self.emit(event.name(), &event.payload());
    }
}

impl<F> EventSink for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn emit(&self, name: &str, payload: &Value) {
        self(name, payload)
    }
}

/// Payload of [`PROGRESS_EVENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub handle: TransferHandle,
    /// Cumulative bytes written to the destination.
    pub written: u64,
    /// Total bytes, when known up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Response metadata of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    pub ok: bool,
    pub redirected: bool,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Payload of [`COMPLETE_EVENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteEvent {
    pub handle: TransferHandle,
    /// Final byte count.
    pub written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<FetchResponse>,
}

/// Payload of [`ERROR_EVENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub handle: TransferHandle,
    pub kind: ErrorKind,
    pub message: String,
}

/// A typed transfer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress(ProgressEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
}

impl TransferEvent {
    /// The event name delivered to sinks.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => PROGRESS_EVENT,
            Self::Complete(_) => COMPLETE_EVENT,
            Self::Error(_) => ERROR_EVENT,
        }
    }

    /// The handle this event belongs to.
    pub fn handle(&self) -> TransferHandle {
        match self {
            Self::Progress(e) => e.handle,
            Self::Complete(e) => e.handle,
            Self::Error(e) => e.handle,
        }
    }

    /// Whether this event ends the transfer.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    /// JSON payload delivered to sinks.
    pub fn payload(&self) -> Value {
        let result = match self {
            Self::Progress(e) => serde_json::to_value(e),
            Self::Complete(e) => serde_json::to_value(e),
            Self::Error(e) => serde_json::to_value(e),
        };
        // These payloads contain only strings, integers and string maps.
        result.unwrap_or(Value::Null)
    }

    /// Rebuild a typed event from a delivered `(name, payload)` pair.
    pub fn from_parts(name: &str, payload: &Value) -> Option<Self> {
        match name {
            PROGRESS_EVENT => serde_json::from_value(payload.clone()).ok().map(Self::Progress),
            COMPLETE_EVENT => serde_json::from_value(payload.clone()).ok().map(Self::Complete),
            ERROR_EVENT => serde_json::from_value(payload.clone()).ok().map(Self::Error),
            _ => None,
        }
    }
}

/// Identifier returned by [`EventBridge::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Fan-out of events to the host's registered listeners.
///
/// Emission works on a snapshot of the listener set, so subscribing or
/// unsubscribing concurrently never drops or duplicates an in-flight event.
/// With no listeners, events are dropped silently.
#[derive(Default)]
pub struct EventBridge {
    listeners: RwLock<IndexMap<ListenerId, Arc<dyn EventSink>>>,
    next_id: AtomicU64,
}

impl EventBridge {
    /// Create a bridge with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sink);
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id)
            .is_some()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventSink>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl EventSink for EventBridge {
    fn emit(&self, name: &str, payload: &Value) {
        for listener in self.snapshot() {
            listener.emit(name, payload);
        }
    }
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// An event as delivered to a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub name: String,
    pub payload: Value,
}

impl EmittedEvent {
    /// Decode into a typed transfer event.
    pub fn to_transfer_event(&self) -> Option<TransferEvent> {
        TransferEvent::from_parts(&self.name, &self.payload)
    }
}

/// Sink forwarding every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EmittedEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmittedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, name: &str, payload: &Value) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(EmittedEvent {
            name: name.to_string(),
            payload: payload.clone(),
        });
    }
}
