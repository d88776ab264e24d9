//! The JSON record envelope shared by the consume and publish paths.
//!
//! A record on the wire is a UTF-8 JSON object with exactly two top-level
//! keys, `data` and `metadata`. Decoding is strict and structural: no
//! defaulting, no schema evolution. The decoder is bound to a handler's
//! declared types at construction, so mismatches surface as classified
//! [`DeserializationError`]s instead of panics deep in a handler.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DeserializationError, Result};
use crate::record::Record;

/// Decoder bound to one handler's data and metadata types.
pub struct RecordCodec<D, M> {
    _types: PhantomData<fn() -> (D, M)>,
}

impl<D, M> RecordCodec<D, M>
where
    D: DeserializeOwned,
    M: DeserializeOwned,
{
    /// Create a decoder for the given type pair.
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }

    /// Decode raw payload bytes into a typed record.
    pub fn decode(&self, raw: &[u8]) -> std::result::Result<Record<D, M>, DeserializationError> {
        let value: Value =
            serde_json::from_slice(raw).map_err(DeserializationError::InvalidJson)?;

        let Value::Object(mut fields) = value else {
            return Err(DeserializationError::NotAnObject);
        };

        let data = fields
            .remove("data")
            .ok_or(DeserializationError::MissingField("data"))?;
        let metadata = fields
            .remove("metadata")
            .ok_or(DeserializationError::MissingField("metadata"))?;

        if let Some(extra) = fields.keys().next() {
            return Err(DeserializationError::UnexpectedField(extra.clone()));
        }

        let data = serde_json::from_value(data)
            .map_err(|cause| DeserializationError::FieldType { field: "data", cause })?;
        let metadata = serde_json::from_value(metadata).map_err(|cause| {
            DeserializationError::FieldType {
                field: "metadata",
                cause,
            }
        })?;

        Ok(Record { data, metadata })
    }
}

impl<D, M> Default for RecordCodec<D, M>
where
    D: DeserializeOwned,
    M: DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a `(data, metadata)` pair into the wire envelope.
pub fn encode<D: Serialize, M: Serialize>(data: &D, metadata: &M) -> Result<Bytes> {
    #[derive(Serialize)]
    struct Envelope<'a, D, M> {
        data: &'a D,
        metadata: &'a M,
    }

    let bytes = serde_json::to_vec(&Envelope { data, metadata })?;
    Ok(Bytes::from(bytes))
}
