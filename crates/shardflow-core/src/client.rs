//! Per-stream client assembly.
//!
//! [`ClientFactory`] holds the settings every stream shares (consumer group,
//! region, endpoints, the optional metrics registry) and produces a
//! [`StreamClientContext`] per stream on demand. The context owns everything
//! the upstream worker loop needs to come up for that stream: worker
//! identity, the coordination key, AWS clients with the right credentials
//! and endpoints, retrieval settings, and the metrics sink selection.
//!
//! Credentials use the default provider chain unless the stream declares a
//! `role_arn`, in which case an assumed-role provider wraps it.

use std::sync::Arc;

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
use prometheus::Registry;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bootstrap;
use crate::config::{
    ConsumerConfig, DynamoDbSettings, InitialPosition, MetricsDriver, MetricsLevel, RetrievalMode,
    StreamSettings,
};
use crate::error::{Error, Result};
use crate::metrics::{LoggingSink, MetricsSink, NullSink, PrometheusSink};

/// Produces per-stream client contexts from shared consumer settings.
pub struct ClientFactory {
    config: ConsumerConfig,
    prometheus: Option<Arc<PrometheusSink>>,
}

impl ClientFactory {
    /// Validate the configuration and apply process-wide toggles.
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        config.validate()?;
        if config.disable_cbor {
            bootstrap::disable_cbor();
        }
        Ok(Self {
            config,
            prometheus: None,
        })
    }

    /// Bind a prometheus registry for streams using the prometheus driver.
    ///
    /// The sink registers its counters once; every stream shares it, labeled
    /// by stream name.
    pub fn with_metrics_registry(mut self, registry: &Registry) -> Result<Self> {
        self.prometheus = Some(Arc::new(PrometheusSink::new(registry)?));
        Ok(self)
    }

    /// The consumer configuration this factory was built from.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Assemble the client context for one stream.
    ///
    /// Each call produces a fresh context with its own worker identity; the
    /// upstream worker loop keeps one context per stream across shard
    /// reassignments.
    pub async fn for_stream(&self, stream: &str) -> Result<StreamClientContext> {
        let settings = self
            .config
            .streams
            .get(stream)
            .cloned()
            .ok_or_else(|| Error::Config(format!("No settings for stream `{stream}`")))?;

        StreamClientContext::new(&self.config, stream, settings, self.prometheus.clone()).await
    }
}

/// Metrics selection for one stream: the level reported upstream and the
/// sink to bind. `sink: None` leaves the upstream default untouched.
pub struct MetricsSelection {
    pub level: MetricsLevel,
    pub sink: Option<Arc<dyn MetricsSink>>,
}

/// Everything the upstream worker loop needs for one stream.
#[derive(Debug)]
pub struct StreamClientContext {
    stream: String,
    application_name: String,
    worker_identifier: String,
    settings: StreamSettings,
    dynamodb: DynamoDbSettings,
    kinesis_url: Option<String>,
    sdk_config: SdkConfig,
    prometheus: Option<Arc<PrometheusSink>>,
}

impl StreamClientContext {
    async fn new(
        config: &ConsumerConfig,
        stream: &str,
        settings: StreamSettings,
        prometheus: Option<Arc<PrometheusSink>>,
    ) -> Result<Self> {
        if stream.is_empty() {
            return Err(Error::Config("Stream name must not be empty".into()));
        }

        let application_name = format!("{}_{}", config.consumer_group, stream);
        let worker_identifier = format!("{}:{}", canonical_host(), Uuid::new_v4());
        let region = Region::new(config.region.clone());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

        if let Some(role_arn) = &settings.role_arn {
            info!(
                stream = %stream,
                role_arn = %role_arn,
                "Assuming role for stream credentials"
            );
            let provider = AssumeRoleProvider::builder(role_arn)
                .session_name(application_name.clone())
                .region(region)
                .build()
                .await;
            loader = loader.credentials_provider(provider);
        } else if let (Some(access_key), Some(secret_key)) =
            (&config.aws_access_key_id, &config.aws_secret_access_key)
        {
            debug!(stream = %stream, "Using explicit AWS credentials");
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "shardflow-explicit-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if settings.retrieval == RetrievalMode::Polling {
            // GetRecords polling runs over HTTP/1.1; only the fan-out
            // subscription needs an HTTP/2-capable client.
            let connector = hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_or_http()
                .enable_http1()
                .build();
            loader = loader.http_client(HyperClientBuilder::new().build(connector));
        }

        let sdk_config = loader.load().await;

        info!(
            stream = %stream,
            application_name = %application_name,
            worker_identifier = %worker_identifier,
            retrieval = ?settings.retrieval,
            "Stream client context initialized"
        );

        Ok(Self {
            stream: stream.to_string(),
            application_name,
            worker_identifier,
            settings,
            dynamodb: config.dynamodb.clone(),
            kinesis_url: config.kinesis_url.clone(),
            sdk_config,
            prometheus,
        })
    }

    /// The stream this context serves.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// The coordination key all worker replicas of this consumer share:
    /// `<consumer_group>_<stream>`.
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Host-qualified unique identity used for lease ownership. Stable for
    /// the life of this context.
    pub fn worker_identifier(&self) -> &str {
        &self.worker_identifier
    }

    /// How records are pulled from the stream.
    pub fn retrieval(&self) -> RetrievalMode {
        self.settings.retrieval
    }

    /// Where a fresh consumer starts reading.
    pub fn initial_position(&self) -> &InitialPosition {
        &self.settings.initial_position
    }

    /// Initial provisioned `(read, write)` capacities for the lease table.
    pub fn lease_table_capacities(&self) -> (u32, u32) {
        (
            self.dynamodb.lease_table_read_capacity,
            self.dynamodb.lease_table_write_capacity,
        )
    }

    /// Kinesis client with this stream's credentials and endpoint.
    pub fn kinesis_client(&self) -> aws_sdk_kinesis::Client {
        let mut builder = aws_sdk_kinesis::config::Builder::from(&self.sdk_config);
        if let Some(url) = &self.kinesis_url {
            builder = builder.endpoint_url(url);
        }
        aws_sdk_kinesis::Client::from_conf(builder.build())
    }

    /// DynamoDB client for the lease table.
    pub fn dynamo_client(&self) -> aws_sdk_dynamodb::Client {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&self.sdk_config);
        if let Some(url) = &self.dynamodb.url {
            builder = builder.endpoint_url(url);
        }
        aws_sdk_dynamodb::Client::from_conf(builder.build())
    }

    /// CloudWatch client for upstream metric publication.
    pub fn cloudwatch_client(&self) -> aws_sdk_cloudwatch::Client {
        aws_sdk_cloudwatch::Client::new(&self.sdk_config)
    }

    /// Metrics level and sink for this stream, per its configured driver.
    pub fn metrics(&self) -> MetricsSelection {
        let sink: Option<Arc<dyn MetricsSink>> = match self.settings.metrics_driver {
            MetricsDriver::Default => None,
            MetricsDriver::None => Some(Arc::new(NullSink)),
            MetricsDriver::Logging => Some(Arc::new(LoggingSink)),
            MetricsDriver::Prometheus => match &self.prometheus {
                Some(sink) => Some(sink.clone() as Arc<dyn MetricsSink>),
                None => {
                    warn!(
                        stream = %self.stream,
                        "Prometheus driver selected but no registry was provided, discarding metrics"
                    );
                    Some(Arc::new(NullSink))
                }
            },
        };

        MetricsSelection {
            level: self.settings.metrics_level,
            sink,
        }
    }
}

fn canonical_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
