//! Configuration structures for shardflow.
//!
//! Configuration is loaded from TOML files; per-stream settings live under
//! a `[streams.<name>]` table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    /// Consumer group shared by all worker replicas of this application
    pub consumer_group: String,

    /// AWS region identifier
    pub region: String,

    /// Kinesis endpoint override (local stacks, VPC endpoints)
    #[serde(default)]
    pub kinesis_url: Option<String>,

    /// Explicit AWS access key; the default provider chain is used when unset
    #[serde(default)]
    pub aws_access_key_id: Option<String>,

    /// Explicit AWS secret key
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,

    /// Disable CBOR wire encoding in the underlying SDK (process-wide)
    #[serde(default)]
    pub disable_cbor: bool,

    /// Lease-store configuration
    #[serde(default)]
    pub dynamodb: DynamoDbSettings,

    /// Checkpointing configuration
    #[serde(default)]
    pub checkpointing: CheckpointingConfig,

    /// Per-stream settings, keyed by stream name
    #[serde(default)]
    pub streams: HashMap<String, StreamSettings>,
}

/// DynamoDB lease-table settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DynamoDbSettings {
    /// Lease-store endpoint override
    #[serde(default)]
    pub url: Option<String>,

    /// Initial provisioned read capacity for the lease table
    #[serde(default = "default_lease_table_read_capacity")]
    pub lease_table_read_capacity: u32,

    /// Initial provisioned write capacity for the lease table
    #[serde(default = "default_lease_table_write_capacity")]
    pub lease_table_write_capacity: u32,
}

impl Default for DynamoDbSettings {
    fn default() -> Self {
        Self {
            url: None,
            lease_table_read_capacity: default_lease_table_read_capacity(),
            lease_table_write_capacity: default_lease_table_write_capacity(),
        }
    }
}

/// Checkpointing behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointingConfig {
    /// When checkpoints are issued
    #[serde(default)]
    pub strategy: CheckpointStrategy,

    /// Retry budget for retryable checkpoint faults
    #[serde(default = "default_checkpoint_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between checkpoint attempts, in milliseconds
    #[serde(default = "default_checkpoint_backoff_ms")]
    pub backoff_ms: u64,
}

impl CheckpointingConfig {
    /// Backoff between checkpoint attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for CheckpointingConfig {
    fn default() -> Self {
        Self {
            strategy: CheckpointStrategy::default(),
            max_retries: default_checkpoint_max_retries(),
            backoff_ms: default_checkpoint_backoff_ms(),
        }
    }
}

/// Checkpoint strategy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStrategy {
    /// One checkpoint after the whole batch succeeded (default)
    #[default]
    Batch,
    /// One checkpoint per successfully handled record
    Record,
}

/// Per-stream consumer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSettings {
    /// How records are pulled from the stream
    #[serde(default)]
    pub retrieval: RetrievalMode,

    /// Where a fresh consumer starts reading
    #[serde(default)]
    pub initial_position: InitialPosition,

    /// Metrics granularity reported upstream
    #[serde(default)]
    pub metrics_level: MetricsLevel,

    /// Which metrics sink to bind
    #[serde(default)]
    pub metrics_driver: MetricsDriver,

    /// IAM role to assume for retrieval credentials
    #[serde(default)]
    pub role_arn: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalMode::default(),
            initial_position: InitialPosition::default(),
            metrics_level: MetricsLevel::default(),
            metrics_driver: MetricsDriver::default(),
            role_arn: None,
        }
    }
}

/// Record retrieval mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Push-based enhanced fan-out subscription (default)
    #[default]
    Fanout,
    /// Periodic polling; constrains the HTTP client to HTTP/1.1
    Polling,
}

/// Starting position for a shard without a checkpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InitialPosition {
    /// Read only records published after the worker came up (default)
    #[default]
    Latest,
    /// Read from the oldest retained record
    TrimHorizon,
    /// Read from a fixed point in time
    AtTimestamp {
        /// The point in time to start reading from
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Metrics granularity.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsLevel {
    /// No metrics
    None,
    /// Aggregated metrics only
    Summary,
    /// Per-shard metrics (default)
    #[default]
    Detailed,
}

/// Metrics sink selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsDriver {
    /// Leave the upstream default sink untouched (default)
    #[default]
    Default,
    /// Discard all metrics
    None,
    /// Emit metrics as structured log events
    Logging,
    /// Bind metrics to a prometheus registry
    Prometheus,
}

// Default value functions
fn default_lease_table_read_capacity() -> u32 {
    1
}
fn default_lease_table_write_capacity() -> u32 {
    1
}
fn default_checkpoint_max_retries() -> u32 {
    3
}
fn default_checkpoint_backoff_ms() -> u64 {
    1000
}

impl ConsumerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConsumerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.consumer_group.is_empty() {
            return Err(crate::Error::Config("Consumer group is required".into()));
        }

        if self.region.is_empty() {
            return Err(crate::Error::Config("Region is required".into()));
        }

        if self.dynamodb.lease_table_read_capacity == 0
            || self.dynamodb.lease_table_write_capacity == 0
        {
            return Err(crate::Error::Config(
                "Lease table capacities must be positive".into(),
            ));
        }

        if self.streams.keys().any(|name| name.is_empty()) {
            return Err(crate::Error::Config("Stream names must not be empty".into()));
        }

        Ok(())
    }
}
