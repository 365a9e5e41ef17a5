use std::time::Duration;

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};

use dlq_api::broker::{BrokerFuture, WriteSession};
use dlq_api::error::BrokerError;
use dlq_api::headers::HeaderMap;
use dlq_api::record::{Delivery, OutboundMessage};

use crate::config::KafkaConfig;
use crate::error::{client_error, publish_error};

/// Per-call producer. Every publish waits for its acknowledgment.
pub struct KafkaWriteSession {
    producer: Option<FutureProducer>,
    ack_timeout: Duration,
}

impl KafkaWriteSession {
    pub(crate) fn open(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = config
            .writer_config()
            .create()
            .map_err(|e| client_error("create producer", e))?;
        tracing::debug!("write session opened");
        Ok(Self {
            producer: Some(producer),
            ack_timeout: config.ack_timeout(),
        })
    }
}

pub(crate) fn to_owned_headers(headers: &HeaderMap<Vec<u8>>) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(value.as_slice()),
            })
        })
}

impl WriteSession for KafkaWriteSession {
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        message: OutboundMessage,
    ) -> BrokerFuture<'a, Delivery> {
        Box::pin(async move {
            let producer = self
                .producer
                .as_ref()
                .ok_or_else(|| BrokerError::unavailable("write session is closed"))?;

            let mut record: FutureRecord<'_, [u8], [u8]> =
                FutureRecord::to(topic).headers(to_owned_headers(&message.headers));
            if let Some(key) = message.key.as_deref() {
                record = record.key(key);
            }
            if let Some(value) = message.value.as_deref() {
                record = record.payload(value);
            }

            match producer.send(record, self.ack_timeout).await {
                Ok((partition, offset)) => Ok(Delivery { partition, offset }),
                Err((e, _)) => Err(publish_error(topic, e)),
            }
        })
    }

    fn close(&mut self) {
        if self.producer.take().is_some() {
            tracing::debug!("write session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::Headers;

    #[test]
    fn headers_keep_order() {
        let mut headers = HeaderMap::new();
        headers.insert("correlation-id", b"abc".to_vec());
        headers.insert("content-type", b"application/json".to_vec());

        let owned = to_owned_headers(&headers);
        assert_eq!(owned.count(), 2);
        let first = owned.get(0);
        assert_eq!(first.key, "correlation-id");
        assert_eq!(first.value, Some(&b"abc"[..]));
        assert_eq!(owned.get(1).key, "content-type");
    }
}
