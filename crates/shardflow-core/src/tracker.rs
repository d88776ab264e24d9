//! Sequence-number tracking across shards.

use dashmap::DashMap;

/// Tracks the latest observed and latest checkpointed sequence number per
/// `(stream, shard)`.
///
/// Shard processors feed the tracker; it exists for observability only and
/// never influences checkpoint decisions.
pub struct SequenceTracker {
    /// Latest sequence number handed to a processor
    observed: DashMap<(String, String), String>,

    /// Latest sequence number covered by a durable checkpoint
    checkpointed: DashMap<(String, String), String>,
}

impl SequenceTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self {
            observed: DashMap::new(),
            checkpointed: DashMap::new(),
        }
    }

    /// Record the latest sequence number seen on a shard.
    pub fn record_observed(&self, stream: &str, shard_id: &str, sequence_number: &str) {
        self.observed.insert(
            (stream.to_string(), shard_id.to_string()),
            sequence_number.to_string(),
        );
    }

    /// Record the latest checkpointed sequence number on a shard.
    pub fn record_checkpointed(&self, stream: &str, shard_id: &str, sequence_number: &str) {
        self.checkpointed.insert(
            (stream.to_string(), shard_id.to_string()),
            sequence_number.to_string(),
        );
    }

    /// Latest observed sequence number for a shard.
    pub fn observed(&self, stream: &str, shard_id: &str) -> Option<String> {
        self.observed
            .get(&(stream.to_string(), shard_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Latest checkpointed sequence number for a shard.
    pub fn checkpointed(&self, stream: &str, shard_id: &str) -> Option<String> {
        self.checkpointed
            .get(&(stream.to_string(), shard_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Whether a shard has handled records not yet covered by a checkpoint.
    pub fn pending(&self, stream: &str, shard_id: &str) -> bool {
        match self.observed(stream, shard_id) {
            None => false,
            Some(observed) => self.checkpointed(stream, shard_id).as_deref() != Some(&observed),
        }
    }

    /// All `(stream, shard)` pairs with observed records.
    pub fn shards(&self) -> Vec<(String, String)> {
        self.observed.iter().map(|e| e.key().clone()).collect()
    }

    /// Forget a shard, e.g. after its lease moved to another worker.
    pub fn forget(&self, stream: &str, shard_id: &str) {
        let key = (stream.to_string(), shard_id.to_string());
        self.observed.remove(&key);
        self.checkpointed.remove(&key);
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_tracker() {
        let tracker = SequenceTracker::new();

        tracker.record_observed("orders", "shard-0", "100");
        assert_eq!(tracker.observed("orders", "shard-0"), Some("100".into()));
        assert!(tracker.pending("orders", "shard-0"));

        tracker.record_checkpointed("orders", "shard-0", "100");
        assert!(!tracker.pending("orders", "shard-0"));

        tracker.record_observed("orders", "shard-0", "200");
        assert!(tracker.pending("orders", "shard-0"));
    }

    #[test]
    fn test_tracker_multiple_shards() {
        let tracker = SequenceTracker::new();

        tracker.record_observed("orders", "shard-0", "100");
        tracker.record_observed("orders", "shard-1", "200");
        tracker.record_observed("payments", "shard-0", "50");

        assert_eq!(tracker.shards().len(), 3);

        tracker.forget("orders", "shard-1");
        assert_eq!(tracker.shards().len(), 2);
        assert!(!tracker.pending("orders", "shard-1"));
    }

    #[test]
    fn test_untracked_shard_has_nothing_pending() {
        let tracker = SequenceTracker::new();
        assert!(!tracker.pending("orders", "shard-9"));
        assert_eq!(tracker.checkpointed("orders", "shard-9"), None);
    }
}
