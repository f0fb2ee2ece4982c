//! Progress reporting and cooperative cancellation for long operations.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress events emitted by the reconciler, executor and scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// An operation is starting with `total` nodes to visit.
    Started { operation: &'static str, total: usize },
    /// `current` of `total` nodes handled.
    Advanced { current: usize, total: usize },
    /// Free-form status line.
    Status { message: String },
}

/// Callback for progress updates (clonable into worker threads).
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Receives progress on the thread that owns the session.
pub trait ProgressSink {
    fn progress(&self, current: usize, max: usize);

    /// Called once per operation with a one-line summary and, if the
    /// operation failed as a whole, the error.
    fn finished(&self, summary: &str, error: Option<&str>);

    fn status(&self, _message: &str) {}
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _current: usize, _max: usize) {}

    fn finished(&self, _summary: &str, _error: Option<&str>) {}
}

/// Helper for reporting per-node progress to a callback.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    total: usize,
    processed: AtomicUsize,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, total: usize) -> Self {
        Self {
            callback,
            total,
            processed: AtomicUsize::new(0),
        }
    }

    /// Reporter without a callback; still counts.
    pub fn silent(total: usize) -> Self {
        Self::new(None, total)
    }

    /// Report that an operation is starting.
    pub fn started(&self, operation: &'static str) {
        if let Some(ref callback) = self.callback {
            callback(ProgressEvent::Started {
                operation,
                total: self.total,
            });
        }
    }

    /// Report one more node handled; returns the new count.
    pub fn node_done(&self) -> usize {
        let current = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref callback) = self.callback {
            callback(ProgressEvent::Advanced {
                current,
                total: self.total,
            });
        }
        current
    }

    pub fn status(&self, message: &str) {
        if let Some(ref callback) = self.callback {
            callback(ProgressEvent::Status {
                message: message.to_string(),
            });
        }
    }

    pub fn count(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Continue counting from a running total of an earlier batch.
    pub fn set_count(&self, count: usize) {
        self.processed.store(count, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Shared cancellation flag, checked between nodes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear a previous request so the token can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
