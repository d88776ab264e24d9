//! Record types flowing through the consumer runtime.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw record as delivered by the upstream retrieval loop.
///
/// Ordering within a shard is given by `sequence_number`, an opaque string
/// that compares lexicographically in delivery order.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Opaque ordered sequence number
    pub sequence_number: String,

    /// Partition key the producer chose
    pub partition_key: String,

    /// Undecoded payload bytes
    pub data: Bytes,

    /// When the stream service received the record
    pub approximate_arrival_timestamp: DateTime<Utc>,
}

/// A decoded record: the two halves of the wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<D, M> {
    /// Business payload
    pub data: D,
    /// Transport-level metadata the producer attached
    pub metadata: M,
}

impl<D, M> Record<D, M> {
    pub fn new(data: D, metadata: M) -> Self {
        Self { data, metadata }
    }
}

/// Per-record side channel passed into handler callbacks so handlers can
/// correlate and log without re-parsing the payload.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Owning stream name
    pub stream: String,

    /// Shard the record came from
    pub shard_id: String,

    /// Raw sequence number of the record
    pub sequence_number: String,

    /// Partition key of the record
    pub partition_key: String,
}
