//! Error types for the shardflow core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for shardflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type handlers use to report failures with their original cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for shardflow.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record could not be decoded into the handler's declared types
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),

    /// A user handler reported a failure
    #[error("Handler failed on stream {stream} at sequence number {sequence_number}")]
    Handler {
        /// Stream the failing record came from
        stream: String,
        /// Sequence number of the failing record
        sequence_number: String,
        /// The handler's original error
        #[source]
        source: BoxError,
    },

    /// Checkpoint could not be advanced
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Outbound publish failed
    #[error("Publish to stream {stream} failed: {message}")]
    Publish { stream: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode failures for the two-field JSON record envelope.
///
/// The processor routes these to the handler's decode-failure callback and
/// skips the record; they never abort a batch on their own.
#[derive(Error, Debug)]
pub enum DeserializationError {
    /// Payload is not parseable JSON
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Payload parsed, but the top level is not an object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// One of the two required top-level fields is absent
    #[error("missing top-level field `{0}`")]
    MissingField(&'static str),

    /// The envelope carries a key other than `data` and `metadata`
    #[error("unexpected top-level field `{0}`")]
    UnexpectedField(String),

    /// A field is present but does not match the handler's declared type
    #[error("field `{field}` does not match the declared type: {cause}")]
    FieldType {
        field: &'static str,
        #[source]
        cause: serde_json::Error,
    },
}

/// Classified faults from the upstream checkpoint handle.
///
/// Callers wrapping an upstream client map its failures into one of these
/// before handing them to the retry policy; anything unclassifiable belongs
/// in `NonRetryable`.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Transient coordination-layer fault, worth retrying
    #[error("retryable checkpoint failure: {0}")]
    Retryable(String),

    /// Upstream rate-limited the checkpoint call
    #[error("checkpoint throttled: {0}")]
    Throttling(String),

    /// Permanent fault (invalid state, lost lease, shutdown)
    #[error("non-retryable checkpoint failure: {0}")]
    NonRetryable(String),
}

impl CheckpointError {
    /// Whether the retry policy may attempt this fault again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Throttling(_))
    }

    /// Whether exhausting retries on this fault is swallowed rather than raised.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttling(_))
    }
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
