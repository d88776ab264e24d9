//! Checkpoint handle and bounded retry policy.
//!
//! The upstream library hands the processor an opaque checkpoint handle with
//! every batch and terminal event. All checkpoint traffic goes through
//! [`CheckpointRetryPolicy`], which classifies faults and bounds the retry
//! loop at `1 + max_retries` total attempts with a fixed backoff between
//! them.
//!
//! Throttling exhaustion is swallowed: dropping a checkpoint opportunity is
//! strictly safer than crashing the processor, since the next successful
//! batch advances the checkpoint anyway. Non-retryable faults usually mean
//! the lease is gone and retrying would be wrong.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::CheckpointingConfig;
use crate::error::CheckpointError;

/// Opaque handle to the upstream checkpoint store.
///
/// Implementations map their client's failures into [`CheckpointError`]
/// before returning; unknown faults are non-retryable.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Advance the lease to the latest record of the current batch.
    async fn checkpoint(&self) -> Result<(), CheckpointError>;

    /// Advance the lease to a specific sequence number.
    async fn checkpoint_at(&self, sequence_number: &str) -> Result<(), CheckpointError>;
}

/// Bounded fixed-delay retry loop around a checkpoint handle.
#[derive(Clone)]
pub struct CheckpointRetryPolicy {
    max_retries: u32,
    backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl CheckpointRetryPolicy {
    /// Create a policy whose backoff sleep is interrupted when `shutdown`
    /// flips to `true`; an interrupted retry loop surfaces its last error.
    pub fn new(config: &CheckpointingConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff(),
            shutdown,
        }
    }

    /// Create a policy that sleeps its full backoff without a shutdown hook.
    pub fn standalone(config: &CheckpointingConfig) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(config, rx)
    }

    /// Run one checkpoint operation through the retry loop.
    ///
    /// `sequence_number: None` advances to the latest record of the current
    /// batch; `Some(s)` advances to `s`.
    pub async fn run(
        &self,
        checkpointer: &dyn Checkpointer,
        sequence_number: Option<&str>,
    ) -> Result<(), CheckpointError> {
        let mut failures: u32 = 0;

        loop {
            let result = match sequence_number {
                Some(seq) => checkpointer.checkpoint_at(seq).await,
                None => checkpointer.checkpoint().await,
            };

            let err = match result {
                Ok(()) => {
                    debug!(sequence_number = ?sequence_number, "Checkpoint advanced");
                    return Ok(());
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(error = %err, "Non-retryable checkpoint fault, giving up");
                return Err(err);
            }

            failures += 1;
            if failures > self.max_retries {
                if err.is_throttling() {
                    warn!(
                        attempts = failures,
                        error = %err,
                        "Checkpoint throttled until retries ran out, deferring to the next batch"
                    );
                    return Ok(());
                }
                warn!(attempts = failures, error = %err, "Checkpoint retries exhausted");
                return Err(err);
            }

            warn!(
                attempt = failures,
                max_retries = self.max_retries,
                backoff_ms = self.backoff.as_millis() as u64,
                error = %err,
                "Checkpoint failed, backing off before retry"
            );

            if self.backoff_interrupted().await {
                debug!("Shutdown requested during checkpoint backoff");
                return Err(err);
            }
        }
    }

    /// Sleep the configured backoff; returns `true` when a shutdown signal
    /// cut the sleep short.
    async fn backoff_interrupted(&self) -> bool {
        if *self.shutdown.borrow() {
            return true;
        }

        let mut shutdown = self.shutdown.clone();
        let stopped = async move {
            let result = shutdown.wait_for(|stop| *stop).await.map(|_| ());
            match result {
                Ok(()) => (),
                // Shutdown channel owner is gone; nothing will ever signal.
                Err(_) => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => false,
            _ = stopped => true,
        }
    }
}
