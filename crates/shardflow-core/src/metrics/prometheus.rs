//! Prometheus metrics export.

use prometheus::{IntCounterVec, Opts, Registry};

use super::MetricsSink;
use crate::error::Result;

/// Sink backed by a prometheus registry; all counters are labeled by stream.
#[derive(Debug)]
pub struct PrometheusSink {
    records_decoded: IntCounterVec,
    decode_failures: IntCounterVec,
    handler_failures: IntCounterVec,
    checkpoints_issued: IntCounterVec,
    checkpoints_failed: IntCounterVec,
}

impl PrometheusSink {
    /// Create the counters and register them.
    ///
    /// Registering twice in the same registry is an error; a consumer keeps
    /// one sink and shares it across streams.
    pub fn new(registry: &Registry) -> Result<Self> {
        let records_decoded = IntCounterVec::new(
            Opts::new(
                "shardflow_records_decoded_total",
                "Records decoded and dispatched to handlers",
            ),
            &["stream"],
        )?;
        let decode_failures = IntCounterVec::new(
            Opts::new(
                "shardflow_decode_failures_total",
                "Records skipped because their payload could not be decoded",
            ),
            &["stream"],
        )?;
        let handler_failures = IntCounterVec::new(
            Opts::new(
                "shardflow_handler_failures_total",
                "Batches aborted by a handler failure",
            ),
            &["stream"],
        )?;
        let checkpoints_issued = IntCounterVec::new(
            Opts::new(
                "shardflow_checkpoints_issued_total",
                "Checkpoints durably advanced",
            ),
            &["stream"],
        )?;
        let checkpoints_failed = IntCounterVec::new(
            Opts::new(
                "shardflow_checkpoints_failed_total",
                "Checkpoints abandoned after exhausting retries",
            ),
            &["stream"],
        )?;

        registry.register(Box::new(records_decoded.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(handler_failures.clone()))?;
        registry.register(Box::new(checkpoints_issued.clone()))?;
        registry.register(Box::new(checkpoints_failed.clone()))?;

        Ok(Self {
            records_decoded,
            decode_failures,
            handler_failures,
            checkpoints_issued,
            checkpoints_failed,
        })
    }
}

impl MetricsSink for PrometheusSink {
    fn record_decoded(&self, stream: &str) {
        self.records_decoded.with_label_values(&[stream]).inc();
    }

    fn decode_failure(&self, stream: &str) {
        self.decode_failures.with_label_values(&[stream]).inc();
    }

    fn handler_failure(&self, stream: &str) {
        self.handler_failures.with_label_values(&[stream]).inc();
    }

    fn checkpoint_issued(&self, stream: &str) {
        self.checkpoints_issued.with_label_values(&[stream]).inc();
    }

    fn checkpoint_failed(&self, stream: &str) {
        self.checkpoints_failed.with_label_values(&[stream]).inc();
    }
}
