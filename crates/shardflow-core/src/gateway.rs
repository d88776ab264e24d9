//! Outbound publish path.
//!
//! Serializes `(data, metadata)` pairs into the shared wire envelope and
//! emits them through the Kinesis producer client. The partition-key policy
//! is explicit: the default derives a deterministic key from the serialized
//! metadata, so records carrying the same metadata land on the same shard.

use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::codec;
use crate::error::{Error, Result};

/// How partition keys are chosen for emitted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionKeyPolicy {
    /// crc32 of the serialized metadata, hex-encoded (default)
    #[default]
    MetadataHash,
    /// A fresh uuid per record, spreading load across shards
    Random,
}

/// Typed publisher for the two-field record envelope.
pub struct OutboundGateway {
    client: aws_sdk_kinesis::Client,
    partition_key_policy: PartitionKeyPolicy,
}

impl OutboundGateway {
    pub fn new(client: aws_sdk_kinesis::Client) -> Self {
        Self {
            client,
            partition_key_policy: PartitionKeyPolicy::default(),
        }
    }

    pub fn with_partition_key_policy(mut self, policy: PartitionKeyPolicy) -> Self {
        self.partition_key_policy = policy;
        self
    }

    /// Publish one record, deriving the partition key from the policy.
    pub async fn send<D, M>(&self, stream: &str, data: &D, metadata: &M) -> Result<()>
    where
        D: Serialize + Sync,
        M: Serialize + Sync,
    {
        let partition_key = self.partition_key(metadata)?;
        self.send_with_partition_key(stream, data, metadata, &partition_key)
            .await
    }

    /// Publish one record under a caller-supplied partition key.
    pub async fn send_with_partition_key<D, M>(
        &self,
        stream: &str,
        data: &D,
        metadata: &M,
        partition_key: &str,
    ) -> Result<()>
    where
        D: Serialize + Sync,
        M: Serialize + Sync,
    {
        let payload = codec::encode(data, metadata)?;

        self.client
            .put_record()
            .stream_name(stream)
            .partition_key(partition_key)
            .data(Blob::new(payload.to_vec()))
            .send()
            .await
            .map_err(|err| Error::Publish {
                stream: stream.to_string(),
                message: err.to_string(),
            })?;

        debug!(stream, partition_key, "Record published");
        Ok(())
    }

    /// Publish several records in one request.
    pub async fn send_batch<D, M>(&self, stream: &str, records: &[(D, M)]) -> Result<()>
    where
        D: Serialize + Sync,
        M: Serialize + Sync,
    {
        if records.is_empty() {
            return Ok(());
        }

        let mut request = self.client.put_records().stream_name(stream);
        for (data, metadata) in records {
            let payload = codec::encode(data, metadata)?;
            let entry = PutRecordsRequestEntry::builder()
                .data(Blob::new(payload.to_vec()))
                .partition_key(self.partition_key(metadata)?)
                .build()
                .map_err(|err| Error::Publish {
                    stream: stream.to_string(),
                    message: err.to_string(),
                })?;
            request = request.records(entry);
        }

        request.send().await.map_err(|err| Error::Publish {
            stream: stream.to_string(),
            message: err.to_string(),
        })?;

        debug!(stream, count = records.len(), "Batch published");
        Ok(())
    }

    fn partition_key<M: Serialize>(&self, metadata: &M) -> Result<String> {
        match self.partition_key_policy {
            PartitionKeyPolicy::MetadataHash => {
                let bytes = serde_json::to_vec(metadata)?;
                Ok(format!("{:08x}", crc32fast::hash(&bytes)))
            }
            PartitionKeyPolicy::Random => Ok(Uuid::new_v4().to_string()),
        }
    }
}
