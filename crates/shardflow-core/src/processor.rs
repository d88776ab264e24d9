//! Per-shard record processor.
//!
//! One processor exists per shard assignment and is discarded when the
//! shard ends or its lease moves. The upstream library drives it through
//! [`RecordProcessor`]: `initialize`, then any number of `process_records`
//! calls, then exactly one terminal callback. Each call carries the opaque
//! checkpoint handle for that invocation.
//!
//! Within a shard, records are decoded, dispatched, and checkpointed in
//! delivery order. A record that fails to decode is routed to the handler's
//! decode-failure callback and skipped; a handler failure aborts the batch
//! so the upstream library redelivers it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointRetryPolicy, Checkpointer};
use crate::codec::RecordCodec;
use crate::config::{CheckpointStrategy, CheckpointingConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::handler::EventHandler;
use crate::metrics::{MetricsSink, NullSink};
use crate::record::{ExecutionContext, RawRecord};
use crate::tracker::SequenceTracker;

/// Input to [`RecordProcessor::initialize`].
pub struct InitializationInput {
    /// Shard this processor was assigned
    pub shard_id: String,
}

/// Input to [`RecordProcessor::process_records`].
pub struct ProcessRecordsInput {
    /// The batch, in delivery order
    pub records: Vec<RawRecord>,
    /// Checkpoint handle valid for this batch
    pub checkpointer: Arc<dyn Checkpointer>,
}

/// Input to [`RecordProcessor::shutdown_requested`].
pub struct ShutdownRequestedInput {
    /// Checkpoint handle for the final checkpoint
    pub checkpointer: Arc<dyn Checkpointer>,
}

/// Input to [`RecordProcessor::shard_ended`].
pub struct ShardEndedInput {
    /// Checkpoint handle; checkpointing past the shard end is required to
    /// move the lease forward
    pub checkpointer: Arc<dyn Checkpointer>,
}

/// Input to [`RecordProcessor::lease_lost`].
pub struct LeaseLostInput;

/// Callback surface the upstream worker loop drives, one instance per shard.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// The shard was assigned to this worker.
    async fn initialize(&self, input: InitializationInput);

    /// A batch of records arrived.
    async fn process_records(&self, input: ProcessRecordsInput) -> Result<()>;

    /// The lease moved to another worker. Must not checkpoint.
    async fn lease_lost(&self, input: LeaseLostInput);

    /// The shard was closed; checkpoint past its end.
    async fn shard_ended(&self, input: ShardEndedInput) -> Result<()>;

    /// The worker is shutting down gracefully; take a final checkpoint.
    async fn shutdown_requested(&self, input: ShutdownRequestedInput) -> Result<()>;
}

/// The per-shard state machine: decode, dispatch, checkpoint.
pub struct ShardProcessor<H: EventHandler> {
    handler: Arc<H>,
    codec: RecordCodec<H::Data, H::Meta>,
    strategy: CheckpointStrategy,
    retry: CheckpointRetryPolicy,
    events: Arc<EventBus>,
    metrics: Arc<dyn MetricsSink>,
    tracker: Arc<SequenceTracker>,
    stream: String,
    shard_id: RwLock<Option<String>>,
}

impl<H: EventHandler> ShardProcessor<H> {
    fn shard_id(&self) -> String {
        self.shard_id.read().clone().unwrap_or_default()
    }

    /// Issue a checkpoint through the retry policy and mirror it into the
    /// tracker on success.
    async fn checkpoint(
        &self,
        checkpointer: &dyn Checkpointer,
        sequence_number: Option<&str>,
    ) -> Result<()> {
        let shard_id = self.shard_id();
        if let Err(err) = self.retry.run(checkpointer, sequence_number).await {
            self.metrics.checkpoint_failed(&self.stream);
            error!(
                stream = %self.stream,
                shard_id = %shard_id,
                error = %err,
                "Checkpoint abandoned"
            );
            return Err(err.into());
        }

        self.metrics.checkpoint_issued(&self.stream);
        let covered = match sequence_number {
            Some(seq) => Some(seq.to_string()),
            None => self.tracker.observed(&self.stream, &shard_id),
        };
        if let Some(seq) = covered {
            self.tracker.record_checkpointed(&self.stream, &shard_id, &seq);
        }
        Ok(())
    }
}

#[async_trait]
impl<H: EventHandler> RecordProcessor for ShardProcessor<H> {
    async fn initialize(&self, input: InitializationInput) {
        info!(
            stream = %self.stream,
            shard_id = %input.shard_id,
            "Shard processor initialized"
        );
        *self.shard_id.write() = Some(input.shard_id.clone());
        self.events.publish(&LifecycleEvent::WorkerInitialized {
            stream: self.stream.clone(),
            shard_id: input.shard_id,
        });
    }

    async fn process_records(&self, input: ProcessRecordsInput) -> Result<()> {
        let shard_id = self.shard_id();

        for raw in &input.records {
            let ctx = ExecutionContext {
                stream: self.stream.clone(),
                shard_id: shard_id.clone(),
                sequence_number: raw.sequence_number.clone(),
                partition_key: raw.partition_key.clone(),
            };
            self.tracker
                .record_observed(&self.stream, &shard_id, &raw.sequence_number);

            let record = match self.codec.decode(&raw.data) {
                Ok(record) => record,
                Err(decode_err) => {
                    // Terminal skip: a poisoned payload must not wedge the
                    // shard, and it does not block the batch checkpoint.
                    self.metrics.decode_failure(&self.stream);
                    self.handler
                        .on_decode_failure(&raw.data, &decode_err, &ctx)
                        .await
                        .map_err(|source| Error::Handler {
                            stream: self.stream.clone(),
                            sequence_number: raw.sequence_number.clone(),
                            source,
                        })?;
                    continue;
                }
            };

            self.metrics.record_decoded(&self.stream);
            if let Err(source) = self.handler.on_record(record, &ctx).await {
                // In record strategy everything before this record is
                // already checkpointed; in batch strategy nothing is.
                self.metrics.handler_failure(&self.stream);
                warn!(
                    stream = %self.stream,
                    shard_id = %shard_id,
                    sequence_number = %raw.sequence_number,
                    "Handler failed, aborting batch"
                );
                return Err(Error::Handler {
                    stream: self.stream.clone(),
                    sequence_number: raw.sequence_number.clone(),
                    source,
                });
            }

            if self.strategy == CheckpointStrategy::Record {
                self.checkpoint(&*input.checkpointer, Some(&raw.sequence_number))
                    .await?;
            }
        }

        if self.strategy == CheckpointStrategy::Batch {
            self.checkpoint(&*input.checkpointer, None).await?;
        }

        Ok(())
    }

    async fn lease_lost(&self, _input: LeaseLostInput) {
        let shard_id = self.shard_id();
        // The lease already belongs to another worker; checkpointing here
        // would clobber its progress.
        info!(
            stream = %self.stream,
            shard_id = %shard_id,
            "Lease lost, releasing shard without checkpoint"
        );
        self.tracker.forget(&self.stream, &shard_id);
        self.events.publish(&LifecycleEvent::LeaseLost {
            stream: self.stream.clone(),
            shard_id,
        });
    }

    async fn shard_ended(&self, input: ShardEndedInput) -> Result<()> {
        let shard_id = self.shard_id();
        info!(
            stream = %self.stream,
            shard_id = %shard_id,
            "Shard ended, taking final checkpoint"
        );
        self.checkpoint(&*input.checkpointer, None).await?;
        self.events.publish(&LifecycleEvent::ShardEnded {
            stream: self.stream.clone(),
            shard_id,
        });
        Ok(())
    }

    async fn shutdown_requested(&self, input: ShutdownRequestedInput) -> Result<()> {
        let shard_id = self.shard_id();
        info!(
            stream = %self.stream,
            shard_id = %shard_id,
            "Shutdown requested, taking final checkpoint"
        );
        self.checkpoint(&*input.checkpointer, None).await?;
        self.events.publish(&LifecycleEvent::WorkerShutdown {
            stream: self.stream.clone(),
            shard_id,
        });
        Ok(())
    }
}

/// Builds one [`ShardProcessor`] per shard assignment for a handler's stream.
///
/// The factory owns what processors share: the handler, the event bus, the
/// metrics sink, and the sequence tracker. Processors themselves are cheap
/// and thrown away on shard loss.
pub struct ShardProcessorFactory<H: EventHandler> {
    handler: Arc<H>,
    config: CheckpointingConfig,
    events: Arc<EventBus>,
    metrics: Arc<dyn MetricsSink>,
    tracker: Arc<SequenceTracker>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<H: EventHandler> ShardProcessorFactory<H> {
    pub fn new(handler: Arc<H>, config: CheckpointingConfig) -> Self {
        Self {
            handler,
            config,
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(NullSink),
            tracker: Arc::new(SequenceTracker::new()),
            shutdown: None,
        }
    }

    /// Share an event bus with other factories and observers.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Emit processor metrics into the given sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share a sequence tracker with other factories.
    pub fn with_tracker(mut self, tracker: Arc<SequenceTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Interrupt checkpoint backoff sleeps when `shutdown` flips to `true`,
    /// bounding shutdown latency to a single checkpoint attempt.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Event bus processors created by this factory publish into.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Create a processor for a fresh shard assignment.
    pub fn create_processor(&self) -> ShardProcessor<H> {
        let retry = match &self.shutdown {
            Some(shutdown) => CheckpointRetryPolicy::new(&self.config, shutdown.clone()),
            None => CheckpointRetryPolicy::standalone(&self.config),
        };

        ShardProcessor {
            handler: self.handler.clone(),
            codec: RecordCodec::new(),
            strategy: self.config.strategy,
            retry,
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            tracker: self.tracker.clone(),
            stream: self.handler.stream().to_string(),
            shard_id: RwLock::new(None),
        }
    }
}
