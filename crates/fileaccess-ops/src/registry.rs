//! Registry of in-flight transfers.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;

/// Opaque identifier of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferHandle(u64);

impl TransferHandle {
    /// Wrap a raw identifier, e.g. one received back from the host.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum TransferState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TransferState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Cancelled | Self::Failed) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug)]
struct TransferEntry {
    state: TransferState,
    cancel: CancellationToken,
}

/// Concurrent map from handle to live transfer state.
///
/// Entries exist only while a transfer is non-terminal; reaching a terminal
/// state removes the entry.
#[derive(Debug)]
pub struct OperationRegistry {
    entries: DashMap<TransferHandle, TransferEntry>,
    next_handle: AtomicU64,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh handle and register it as `Pending`.
    pub fn register(&self) -> (TransferHandle, CancellationToken) {
        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        self.entries.insert(
            handle,
            TransferEntry {
                state: TransferState::Pending,
                cancel: cancel.clone(),
            },
        );
        (handle, cancel)
    }

    /// Current state of a live transfer.
    pub fn lookup(&self, handle: TransferHandle) -> Option<TransferState> {
        self.entries.get(&handle).map(|entry| entry.state)
    }

    /// Move a transfer to `next`, returning whether the transition applied.
    ///
    /// Terminal transitions remove the entry.
    pub fn transition(&self, handle: TransferHandle, next: TransferState) -> bool {
        let applied = match self.entries.get_mut(&handle) {
            Some(mut entry) if entry.state.can_transition_to(next) => {
                entry.state = next;
                true
            }
            _ => false,
        };
        if applied && next.is_terminal() {
            self.entries.remove(&handle);
        }
        applied
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` (and does nothing) when the handle is unknown or
    /// already terminal.
    pub fn cancel(&self, handle: TransferHandle) -> bool {
        match self.entries.get(&handle) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop an entry regardless of state.
    pub fn remove(&self, handle: TransferHandle) -> Option<TransferState> {
        self.entries.remove(&handle).map(|(_, entry)| entry.state)
    }

    /// Handles of all live transfers.
    pub fn handles(&self) -> Vec<TransferHandle> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of live transfers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no transfers are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
