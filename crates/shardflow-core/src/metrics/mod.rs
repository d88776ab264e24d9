//! Processor metrics sinks.

mod prometheus;

pub use self::prometheus::PrometheusSink;

use tracing::debug;

/// Sink for processor-level counters.
///
/// One sink instance serves every stream of a consumer; implementations
/// label by stream name and must be thread-safe.
pub trait MetricsSink: Send + Sync {
    /// A record was decoded successfully.
    fn record_decoded(&self, stream: &str);

    /// A record's payload could not be decoded and was skipped.
    fn decode_failure(&self, stream: &str);

    /// A handler rejected a record, aborting its batch.
    fn handler_failure(&self, stream: &str);

    /// A checkpoint was durably advanced.
    fn checkpoint_issued(&self, stream: &str);

    /// A checkpoint gave up after exhausting its retries.
    fn checkpoint_failed(&self, stream: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_decoded(&self, _stream: &str) {}
    fn decode_failure(&self, _stream: &str) {}
    fn handler_failure(&self, _stream: &str) {}
    fn checkpoint_issued(&self, _stream: &str) {}
    fn checkpoint_failed(&self, _stream: &str) {}
}

/// Sink that emits each observation as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl MetricsSink for LoggingSink {
    fn record_decoded(&self, stream: &str) {
        debug!(stream, metric = "records_decoded", "metric");
    }

    fn decode_failure(&self, stream: &str) {
        debug!(stream, metric = "decode_failures", "metric");
    }

    fn handler_failure(&self, stream: &str) {
        debug!(stream, metric = "handler_failures", "metric");
    }

    fn checkpoint_issued(&self, stream: &str) {
        debug!(stream, metric = "checkpoints_issued", "metric");
    }

    fn checkpoint_failed(&self, stream: &str) {
        debug!(stream, metric = "checkpoints_failed", "metric");
    }
}
