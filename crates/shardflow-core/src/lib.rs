//! Shardflow Core - typed consumer runtime for Amazon Kinesis streams
//!
//! This library sits atop a lease-based Kinesis worker loop and drives raw
//! shard batches through deserialization, typed dispatch, checkpointing, and
//! failure handling:
//!
//! - Per-shard record processors with strict in-order dispatch
//! - Batch or per-record checkpointing with bounded, classified retries
//! - A strict two-field JSON envelope shared by consume and publish paths
//! - Per-stream AWS client assembly (credentials, endpoints, retrieval mode)
//! - Lifecycle events and pluggable metrics sinks

pub mod bootstrap;
pub mod checkpoint;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handler;
pub mod metrics;
pub mod processor;
pub mod record;
pub mod tracker;

// Re-export commonly used types
pub use checkpoint::{CheckpointRetryPolicy, Checkpointer};
pub use client::{ClientFactory, StreamClientContext};
pub use config::{CheckpointStrategy, ConsumerConfig};
pub use error::{BoxError, CheckpointError, DeserializationError};
pub use error::{Error, Result};
pub use events::{EventBus, LifecycleEvent};
pub use gateway::OutboundGateway;
pub use handler::EventHandler;
pub use processor::{RecordProcessor, ShardProcessor, ShardProcessorFactory};
pub use record::{ExecutionContext, RawRecord, Record};
