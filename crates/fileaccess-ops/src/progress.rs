//! Progress tracking for transfers.

use std::time::{Duration, Instant};

use crate::event::ProgressEvent;
use crate::registry::TransferHandle;

/// Cumulative progress of one transfer, with optional event throttling.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    handle: TransferHandle,
    /// Bytes written so far.
    pub written: u64,
    /// Total bytes, when known.
    pub total: Option<u64>,
    interval: Option<Duration>,
    last_emit: Option<Instant>,
    last_emitted_written: Option<u64>,
}

impl TransferProgress {
    /// Start tracking a transfer.
    pub fn new(handle: TransferHandle, total: Option<u64>, interval: Option<Duration>) -> Self {
        Self {
            handle,
            written: 0,
            total,
            interval,
            last_emit: None,
            last_emitted_written: None,
        }
    }

    /// Record a written chunk; returns an event if one is due.
    ///
    /// Without an interval every chunk produces an event. Reaching a known
    /// total always produces one.
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressEvent> {
        self.written += bytes;

        let reached_total = self.total.is_some_and(|total| self.written >= total);
        let due = match (self.interval, self.last_emit) {
            (Some(interval), Some(last)) => last.elapsed() >= interval,
            _ => true,
        };

        if due || reached_total {
            Some(self.mark_emitted())
        } else {
            None
        }
    }

    /// Flush a final event if the last chunk was throttled away.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.written > 0 && self.last_emitted_written != Some(self.written) {
            Some(self.mark_emitted())
        } else {
            None
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0), if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.written as f64 / total as f64) * 100.0),
            None => None,
        }
    }

    fn mark_emitted(&mut self) -> ProgressEvent {
        self.last_emit = Some(Instant::now());
        self.last_emitted_written = Some(self.written);
        ProgressEvent {
            handle: self.handle,
            written: self.written,
            total: self.total,
        }
    }
}
