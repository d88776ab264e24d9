//! The contract user code implements to consume a stream.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{BoxError, DeserializationError};
use crate::record::{ExecutionContext, Record};

/// A typed inbound handler bound to one stream.
///
/// The associated types drive the decoder: both halves of the wire envelope
/// are decoded into `Data` and `Meta` before `on_record` runs. Handlers are
/// shared between all shard processors of their stream and must therefore be
/// safe to call concurrently.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Type of the `data` half of the envelope.
    type Data: DeserializeOwned + Send + 'static;

    /// Type of the `metadata` half of the envelope.
    type Meta: DeserializeOwned + Send + 'static;

    /// Name of the stream this handler binds to.
    fn stream(&self) -> &str;

    /// Called once per successfully decoded record, in shard order.
    ///
    /// Returning an error aborts the current batch; the upstream library
    /// redelivers it.
    async fn on_record(
        &self,
        record: Record<Self::Data, Self::Meta>,
        ctx: &ExecutionContext,
    ) -> std::result::Result<(), BoxError>;

    /// Called when a record's payload cannot be decoded.
    ///
    /// The record is skipped either way; a poisoned payload must not wedge
    /// the shard. Returning an error aborts the batch.
    async fn on_decode_failure(
        &self,
        raw: &[u8],
        error: &DeserializationError,
        ctx: &ExecutionContext,
    ) -> std::result::Result<(), BoxError> {
        let _ = raw;
        warn!(
            stream = %ctx.stream,
            shard_id = %ctx.shard_id,
            sequence_number = %ctx.sequence_number,
            error = %error,
            "Skipping record that could not be decoded"
        );
        Ok(())
    }
}
