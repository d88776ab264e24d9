//! Behavioral tests for the shard processor: ordering, checkpoint strategy,
//! decode-failure skipping, and terminal transitions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;

use shardflow_core::checkpoint::Checkpointer;
use shardflow_core::config::{CheckpointStrategy, CheckpointingConfig};
use shardflow_core::error::{BoxError, CheckpointError, DeserializationError, Error};
use shardflow_core::events::{EventBus, LifecycleEvent};
use shardflow_core::handler::EventHandler;
use shardflow_core::processor::{
    InitializationInput, LeaseLostInput, ProcessRecordsInput, RecordProcessor, ShardEndedInput,
    ShardProcessorFactory, ShutdownRequestedInput,
};
use shardflow_core::record::{ExecutionContext, RawRecord, Record};

#[derive(Debug, Deserialize, PartialEq)]
struct FooEvent {
    value: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct EventMetadata {
    hash: String,
}

/// Handler that records every callback and can be told to fail on a value.
struct RecordingHandler {
    handled: Mutex<Vec<String>>,
    decode_failures: Mutex<Vec<String>>,
    fail_on_value: Option<String>,
}

impl RecordingHandler {
    fn new() -> Self {
        Self {
            handled: Mutex::new(Vec::new()),
            decode_failures: Mutex::new(Vec::new()),
            fail_on_value: None,
        }
    }

    fn failing_on(value: &str) -> Self {
        Self {
            fail_on_value: Some(value.to_string()),
            ..Self::new()
        }
    }

    fn handled(&self) -> Vec<String> {
        self.handled.lock().clone()
    }

    fn decode_failures(&self) -> Vec<String> {
        self.decode_failures.lock().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    type Data = FooEvent;
    type Meta = EventMetadata;

    fn stream(&self) -> &str {
        "foo-event-stream"
    }

    async fn on_record(
        &self,
        record: Record<FooEvent, EventMetadata>,
        _ctx: &ExecutionContext,
    ) -> Result<(), BoxError> {
        self.handled.lock().push(record.data.value.clone());
        if self.fail_on_value.as_deref() == Some(record.data.value.as_str()) {
            return Err(format!("rejected {}", record.data.value).into());
        }
        Ok(())
    }

    async fn on_decode_failure(
        &self,
        _raw: &[u8],
        _error: &DeserializationError,
        ctx: &ExecutionContext,
    ) -> Result<(), BoxError> {
        self.decode_failures.lock().push(ctx.sequence_number.clone());
        Ok(())
    }
}

/// Checkpoint calls observed by the mock: `None` for batch checkpoints,
/// `Some(seq)` for per-record ones.
struct MockCheckpointer {
    calls: Mutex<Vec<Option<String>>>,
    script: Mutex<VecDeque<CheckpointError>>,
}

impl MockCheckpointer {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
        }
    }

    fn scripted(script: Vec<CheckpointError>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
        }
    }

    fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().clone()
    }

    fn record(&self, target: Option<String>) -> Result<(), CheckpointError> {
        self.calls.lock().push(target);
        match self.script.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Checkpointer for MockCheckpointer {
    async fn checkpoint(&self) -> Result<(), CheckpointError> {
        self.record(None)
    }

    async fn checkpoint_at(&self, sequence_number: &str) -> Result<(), CheckpointError> {
        self.record(Some(sequence_number.to_string()))
    }
}

fn raw(sequence_number: &str, payload: &str) -> RawRecord {
    RawRecord {
        sequence_number: sequence_number.to_string(),
        partition_key: "pk-1".to_string(),
        data: Bytes::from(payload.as_bytes().to_vec()),
        approximate_arrival_timestamp: Utc::now(),
    }
}

fn valid(sequence_number: &str, value: &str, hash: &str) -> RawRecord {
    raw(
        sequence_number,
        &format!(r#"{{"data": {{"value": "{value}"}}, "metadata": {{"hash": "{hash}"}}}}"#),
    )
}

fn checkpointing(strategy: CheckpointStrategy) -> CheckpointingConfig {
    CheckpointingConfig {
        strategy,
        max_retries: 2,
        backoff_ms: 1,
    }
}

struct Fixture {
    handler: Arc<RecordingHandler>,
    factory: ShardProcessorFactory<RecordingHandler>,
}

impl Fixture {
    fn new(handler: RecordingHandler, strategy: CheckpointStrategy) -> Self {
        let handler = Arc::new(handler);
        let factory = ShardProcessorFactory::new(handler.clone(), checkpointing(strategy));
        Self { handler, factory }
    }

    async fn processor(
        &self,
    ) -> shardflow_core::processor::ShardProcessor<RecordingHandler> {
        let processor = self.factory.create_processor();
        processor
            .initialize(InitializationInput {
                shard_id: "shardId-000000000000".to_string(),
            })
            .await;
        processor
    }
}

#[tokio::test]
async fn batch_of_valid_records_checkpoints_once() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                valid("49590-2", "second", "a9f0"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    assert_eq!(fixture.handler.handled(), vec!["first", "second"]);
    assert_eq!(checkpointer.calls(), vec![None]);
}

#[tokio::test]
async fn handler_failure_in_batch_mode_checkpoints_nothing() {
    let fixture = Fixture::new(
        RecordingHandler::failing_on("second"),
        CheckpointStrategy::Batch,
    );
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    let err = processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                valid("49590-2", "second", "a9f0"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap_err();

    assert_eq!(fixture.handler.handled(), vec!["first", "second"]);
    assert!(checkpointer.calls().is_empty());
    match err {
        Error::Handler {
            sequence_number,
            source,
            ..
        } => {
            assert_eq!(sequence_number, "49590-2");
            assert_eq!(source.to_string(), "rejected second");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn handler_failure_in_record_mode_keeps_earlier_checkpoints() {
    let fixture = Fixture::new(
        RecordingHandler::failing_on("second"),
        CheckpointStrategy::Record,
    );
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    let err = processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                valid("49590-2", "second", "a9f0"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap_err();

    assert_eq!(fixture.handler.handled(), vec!["first", "second"]);
    assert_eq!(checkpointer.calls(), vec![Some("49590-1".to_string())]);
    assert!(matches!(err, Error::Handler { .. }));
}

#[tokio::test]
async fn record_mode_checkpoints_every_record_in_order() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Record);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                valid("49590-2", "second", "a9f0"),
                valid("49590-3", "third", "c2d7"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    assert_eq!(
        checkpointer.calls(),
        vec![
            Some("49590-1".to_string()),
            Some("49590-2".to_string()),
            Some("49590-3".to_string()),
        ]
    );
}

#[tokio::test]
async fn undecodable_record_is_skipped_and_batch_still_checkpoints() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                raw("49590-2", "{foobar}"),
                valid("49590-3", "third", "c2d7"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    assert_eq!(fixture.handler.handled(), vec!["first", "third"]);
    assert_eq!(fixture.handler.decode_failures(), vec!["49590-2"]);
    assert_eq!(checkpointer.calls(), vec![None]);
}

#[tokio::test]
async fn decode_failure_callback_error_aborts_batch() {
    struct StrictHandler;

    #[async_trait]
    impl EventHandler for StrictHandler {
        type Data = FooEvent;
        type Meta = EventMetadata;

        fn stream(&self) -> &str {
            "foo-event-stream"
        }

        async fn on_record(
            &self,
            _record: Record<FooEvent, EventMetadata>,
            _ctx: &ExecutionContext,
        ) -> Result<(), BoxError> {
            Ok(())
        }

        async fn on_decode_failure(
            &self,
            _raw: &[u8],
            error: &DeserializationError,
            _ctx: &ExecutionContext,
        ) -> Result<(), BoxError> {
            Err(format!("undecodable payload: {error}").into())
        }
    }

    let factory = ShardProcessorFactory::new(
        Arc::new(StrictHandler),
        checkpointing(CheckpointStrategy::Batch),
    );
    let processor = factory.create_processor();
    processor
        .initialize(InitializationInput {
            shard_id: "shardId-000000000000".to_string(),
        })
        .await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    let err = processor
        .process_records(ProcessRecordsInput {
            records: vec![raw("49590-1", "{foobar}")],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Handler { .. }));
    assert!(checkpointer.calls().is_empty());
}

#[tokio::test]
async fn retryable_checkpoint_fault_recovers_within_budget() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::scripted(vec![CheckpointError::Retryable(
        "coordination glitch".into(),
    )]));

    processor
        .process_records(ProcessRecordsInput {
            records: vec![valid("49590-1", "first", "8b04")],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    assert_eq!(checkpointer.calls().len(), 2);
}

#[tokio::test]
async fn persistent_throttling_is_swallowed() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::scripted(vec![
        CheckpointError::Throttling("rate exceeded".into()),
        CheckpointError::Throttling("rate exceeded".into()),
        CheckpointError::Throttling("rate exceeded".into()),
    ]));

    processor
        .process_records(ProcessRecordsInput {
            records: vec![valid("49590-1", "first", "8b04")],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    // 1 + max_retries attempts, then the fault is swallowed.
    assert_eq!(checkpointer.calls().len(), 3);
}

#[tokio::test]
async fn non_retryable_checkpoint_fault_propagates() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::scripted(vec![
        CheckpointError::NonRetryable("lease gone".into()),
    ]));

    let err = processor
        .process_records(ProcessRecordsInput {
            records: vec![valid("49590-1", "first", "8b04")],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap_err();

    assert_eq!(checkpointer.calls().len(), 1);
    assert!(matches!(
        err,
        Error::Checkpoint(CheckpointError::NonRetryable(_))
    ));
}

#[tokio::test]
async fn record_mode_aborts_batch_when_checkpoint_retries_exhaust() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Record);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::scripted(vec![
        CheckpointError::Retryable("down".into()),
        CheckpointError::Retryable("down".into()),
        CheckpointError::Retryable("down".into()),
    ]));

    let err = processor
        .process_records(ProcessRecordsInput {
            records: vec![
                valid("49590-1", "first", "8b04"),
                valid("49590-2", "second", "a9f0"),
            ],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap_err();

    // The batch aborts on exhaustion instead of advancing to the next record.
    assert!(matches!(err, Error::Checkpoint(_)));
    assert_eq!(fixture.handler.handled(), vec!["first"]);
    assert_eq!(checkpointer.calls().len(), 3);
}

#[tokio::test]
async fn terminal_transitions_checkpoint_as_specified() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);

    // shutdown_requested checkpoints once
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());
    processor
        .shutdown_requested(ShutdownRequestedInput {
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();
    assert_eq!(checkpointer.calls(), vec![None]);

    // shard_ended checkpoints once
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());
    processor
        .shard_ended(ShardEndedInput {
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();
    assert_eq!(checkpointer.calls(), vec![None]);

    // lease_lost never checkpoints
    let processor = fixture.processor().await;
    processor.lease_lost(LeaseLostInput).await;
}

#[tokio::test]
async fn initialize_publishes_exactly_one_event() {
    let events = Arc::new(EventBus::new());
    let initialized = Arc::new(AtomicUsize::new(0));
    {
        let initialized = initialized.clone();
        events.subscribe(move |event| {
            if matches!(event, LifecycleEvent::WorkerInitialized { .. }) {
                initialized.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let factory = ShardProcessorFactory::new(
        Arc::new(RecordingHandler::new()),
        checkpointing(CheckpointStrategy::Batch),
    )
    .with_events(events);

    let processor = factory.create_processor();
    processor
        .initialize(InitializationInput {
            shard_id: "shardId-000000000000".to_string(),
        })
        .await;

    assert_eq!(initialized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lease_lost_publishes_event_with_shard() {
    let events = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        events.subscribe(move |event| {
            if let LifecycleEvent::LeaseLost { stream, shard_id } = event {
                seen.lock().push((stream.clone(), shard_id.clone()));
            }
        });
    }

    let factory = ShardProcessorFactory::new(
        Arc::new(RecordingHandler::new()),
        checkpointing(CheckpointStrategy::Batch),
    )
    .with_events(events);

    let processor = factory.create_processor();
    processor
        .initialize(InitializationInput {
            shard_id: "shardId-000000000042".to_string(),
        })
        .await;
    processor.lease_lost(LeaseLostInput).await;

    assert_eq!(
        seen.lock().clone(),
        vec![(
            "foo-event-stream".to_string(),
            "shardId-000000000042".to_string()
        )]
    );
}

#[tokio::test]
async fn empty_batch_still_advances_the_batch_checkpoint() {
    let fixture = Fixture::new(RecordingHandler::new(), CheckpointStrategy::Batch);
    let processor = fixture.processor().await;
    let checkpointer = Arc::new(MockCheckpointer::new());

    processor
        .process_records(ProcessRecordsInput {
            records: vec![],
            checkpointer: checkpointer.clone(),
        })
        .await
        .unwrap();

    assert_eq!(checkpointer.calls(), vec![None]);
    assert!(fixture.handler.handled().is_empty());
}
