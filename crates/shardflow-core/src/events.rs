//! Lifecycle events published by shard processors.
//!
//! Observers run synchronously on the publisher's task and must not block.
//! Events identify processors by stream and shard name only, never by
//! reference, so a processor can be dropped as soon as its lease moves.

use parking_lot::RwLock;
use tracing::debug;

/// Signals emitted at the edges of a shard processor's life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A processor was initialized for a shard
    WorkerInitialized { stream: String, shard_id: String },

    /// A processor was asked to shut down and took its final checkpoint
    WorkerShutdown { stream: String, shard_id: String },

    /// The shard was closed and checkpointed past its end
    ShardEnded { stream: String, shard_id: String },

    /// The lease moved to another worker; no checkpoint was taken
    LeaseLost { stream: String, shard_id: String },
}

impl LifecycleEvent {
    /// Stream the event belongs to.
    pub fn stream(&self) -> &str {
        match self {
            Self::WorkerInitialized { stream, .. }
            | Self::WorkerShutdown { stream, .. }
            | Self::ShardEnded { stream, .. }
            | Self::LeaseLost { stream, .. } => stream,
        }
    }

    /// Shard the event belongs to.
    pub fn shard_id(&self) -> &str {
        match self {
            Self::WorkerInitialized { shard_id, .. }
            | Self::WorkerShutdown { shard_id, .. }
            | Self::ShardEnded { shard_id, .. }
            | Self::LeaseLost { shard_id, .. } => shard_id,
        }
    }
}

type Observer = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// In-process, synchronous event bus.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Observer>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all lifecycle events.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.observers.write().push(Box::new(observer));
    }

    /// Deliver an event to every observer, in subscription order.
    pub fn publish(&self, event: &LifecycleEvent) {
        debug!(
            stream = %event.stream(),
            shard_id = %event.shard_id(),
            event = ?event,
            "Publishing lifecycle event"
        );
        for observer in self.observers.read().iter() {
            observer(event);
        }
    }
}
