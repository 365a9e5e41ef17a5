//! Kafka implementation of the broker seams, on librdkafka.
//!
//! Metadata goes through one long-lived client. Every read or write session
//! gets its own consumer or producer, dropped when the session closes.

mod config;
mod error;
mod reader;
mod writer;

use std::sync::Arc;

use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::RDKafkaErrorCode;

use dlq_api::broker::{BrokerAdmin, BrokerFuture, ReadSession, SessionFactory, WriteSession};
use dlq_api::error::BrokerError;
use dlq_api::record::TopicListing;

pub use config::KafkaConfig;
pub use reader::KafkaReadSession;
pub use writer::KafkaWriteSession;

use error::{blocking, client_error};

/// Kafka cluster handle. Implements [`BrokerAdmin`] and [`SessionFactory`].
pub struct KafkaBroker {
    config: KafkaConfig,
    metadata: Arc<BaseConsumer>,
}

impl KafkaBroker {
    /// Create the metadata client. Does not contact the cluster.
    pub fn new(config: KafkaConfig) -> Result<Self, BrokerError> {
        let metadata: BaseConsumer = config
            .client_config()
            .set("allow.auto.create.topics", "false")
            .create()
            .map_err(|e| client_error("create metadata client", e))?;
        tracing::info!(bootstrap_servers = %config.bootstrap_servers, "kafka client created");
        Ok(Self {
            config,
            metadata: Arc::new(metadata),
        })
    }
}

/// Broker-internal topics are prefixed with a double underscore.
fn is_internal(name: &str) -> bool {
    name.starts_with("__")
}

impl BrokerAdmin for KafkaBroker {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<TopicListing>> {
        let client = self.metadata.clone();
        let timeout = self.config.metadata_timeout();
        Box::pin(blocking(move || {
            let md = client
                .fetch_metadata(None, timeout)
                .map_err(|e| client_error("fetch metadata", e))?;
            Ok(md
                .topics()
                .iter()
                .filter(|t| t.error().is_none())
                .map(|t| TopicListing {
                    name: t.name().to_string(),
                    internal: is_internal(t.name()),
                })
                .collect())
        }))
    }

    fn partition_count<'a>(&'a self, topic: &'a str) -> BrokerFuture<'a, Option<u32>> {
        let client = self.metadata.clone();
        let timeout = self.config.metadata_timeout();
        let topic = topic.to_string();
        Box::pin(blocking(move || {
            let md = client
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| client_error("fetch metadata", e))?;
            let Some(t) = md.topics().iter().find(|t| t.name() == topic) else {
                return Ok(None);
            };
            match t.error().map(RDKafkaErrorCode::from) {
                None => Ok(Some(t.partitions().len() as u32)),
                Some(RDKafkaErrorCode::UnknownTopicOrPartition) => Ok(None),
                Some(code) => Err(BrokerError::unavailable(format!("metadata for {topic}: {code}"))),
            }
        }))
    }
}

impl SessionFactory for KafkaBroker {
    fn open_reader(&self) -> BrokerFuture<'_, Box<dyn ReadSession>> {
        Box::pin(async move {
            let session = KafkaReadSession::open(&self.config)?;
            Ok(Box::new(session) as Box<dyn ReadSession>)
        })
    }

    fn open_writer(&self) -> BrokerFuture<'_, Box<dyn WriteSession>> {
        Box::pin(async move {
            let session = KafkaWriteSession::open(&self.config)?;
            Ok(Box::new(session) as Box<dyn WriteSession>)
        })
    }
}
