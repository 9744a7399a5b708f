//! Broadcast-based emitter for local [`RunnerEvent`] dispatch.

use std::sync::atomic::{AtomicU64, Ordering};

use drover_core::events::RunnerEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-based lifecycle emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers are dropped (lagged)
/// rather than blocking the orchestrator.
pub struct RunnerEventEmitter {
    tx: broadcast::Sender<RunnerEvent>,
    emit_count: AtomicU64,
}

impl RunnerEventEmitter {
    /// Create an emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Returns the receiver count.
    pub fn emit(&self, event: RunnerEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a `Stream`, for consumers that compose with stream
    /// combinators. Lagged entries surface as stream errors.
    pub fn stream(&self) -> BroadcastStream<RunnerEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for RunnerEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
