use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::{Headers, Message};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};

use dlq_api::broker::{BrokerFuture, ReadSession};
use dlq_api::error::BrokerError;
use dlq_api::record::BrokerRecord;

use crate::config::KafkaConfig;
use crate::error::{blocking, client_error};

static READER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique, throwaway group id. Readers never commit, so the group leaves no state behind.
pub(crate) fn reader_group_id() -> String {
    let seq = READER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("dlq-reader-{}-{seq}", std::process::id())
}

/// Per-call consumer with manual assignment.
///
/// Seeks are recorded and applied as a fresh assignment before the next
/// poll, so they work on partitions the client has not started fetching yet.
pub struct KafkaReadSession {
    consumer: Option<Arc<BaseConsumer>>,
    topic: Option<String>,
    positions: BTreeMap<i32, Offset>,
    reassign: bool,
    timeout: Duration,
    max_poll_records: usize,
}

impl KafkaReadSession {
    pub(crate) fn open(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let group = reader_group_id();
        let consumer: BaseConsumer = config
            .reader_config(&group)
            .create()
            .map_err(|e| client_error("create consumer", e))?;
        tracing::debug!(group = %group, "read session opened");
        Ok(Self {
            consumer: Some(Arc::new(consumer)),
            topic: None,
            positions: BTreeMap::new(),
            reassign: false,
            timeout: config.metadata_timeout(),
            max_poll_records: config.max_poll_records.max(1),
        })
    }

    fn consumer(&self) -> Result<Arc<BaseConsumer>, BrokerError> {
        self.consumer
            .clone()
            .ok_or_else(|| BrokerError::unavailable("read session is closed"))
    }

    fn topic(&self) -> Result<String, BrokerError> {
        self.topic
            .clone()
            .ok_or_else(|| BrokerError::not_assigned("no topic assigned"))
    }

    fn assignment(&self, topic: &str) -> Result<TopicPartitionList, BrokerError> {
        let mut tpl = TopicPartitionList::with_capacity(self.positions.len());
        for (&p, &offset) in &self.positions {
            tpl.add_partition_offset(topic, p, offset)
                .map_err(|e| client_error("build assignment", e))?;
        }
        Ok(tpl)
    }

    /// Batched offset lookup for every partition. `which` is
    /// [`Offset::Beginning`] or [`Offset::End`].
    fn list_offsets<'a>(
        &'a mut self,
        partitions: &'a [i32],
        which: Offset,
    ) -> BrokerFuture<'a, HashMap<i32, i64>> {
        Box::pin(async move {
            let consumer = self.consumer()?;
            let topic = self.topic()?;
            let timeout = self.timeout;
            let mut query = TopicPartitionList::with_capacity(partitions.len());
            for &p in partitions {
                query
                    .add_partition_offset(&topic, p, which)
                    .map_err(|e| client_error("build offset query", e))?;
            }

            blocking(move || {
                let answer = consumer
                    .offsets_for_times(query, timeout)
                    .map_err(|e| client_error("list offsets", e))?;
                answer
                    .elements()
                    .iter()
                    .map(|el| match el.offset() {
                        Offset::Offset(o) => Ok((el.partition(), o)),
                        other => Err(BrokerError::unavailable(format!(
                            "no offset for {}/{}: {other:?}",
                            el.topic(),
                            el.partition()
                        ))),
                    })
                    .collect()
            })
            .await
        })
    }
}

impl ReadSession for KafkaReadSession {
    fn assign<'a>(&'a mut self, topic: &'a str, partitions: &'a [i32]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.consumer()?;
            self.topic = Some(topic.to_string());
            self.positions = partitions.iter().map(|&p| (p, Offset::Invalid)).collect();
            self.reassign = true;
            Ok(())
        })
    }

    fn beginning_offsets<'a>(
        &'a mut self,
        partitions: &'a [i32],
    ) -> BrokerFuture<'a, HashMap<i32, i64>> {
        self.list_offsets(partitions, Offset::Beginning)
    }

    fn end_offsets<'a>(&'a mut self, partitions: &'a [i32]) -> BrokerFuture<'a, HashMap<i32, i64>> {
        self.list_offsets(partitions, Offset::End)
    }

    fn seek(&mut self, partition: i32, offset: i64) -> Result<(), BrokerError> {
        let slot = self.positions.get_mut(&partition).ok_or_else(|| {
            BrokerError::not_assigned(format!("partition {partition} is not assigned"))
        })?;
        *slot = Offset::Offset(offset);
        self.reassign = true;
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> BrokerFuture<'_, Vec<BrokerRecord>> {
        Box::pin(async move {
            let consumer = self.consumer()?;
            let topic = self.topic()?;
            let assignment = if self.reassign {
                Some(self.assignment(&topic)?)
            } else {
                None
            };
            self.reassign = false;
            let max = self.max_poll_records;

            blocking(move || {
                if let Some(tpl) = assignment {
                    consumer
                        .assign(&tpl)
                        .map_err(|e| client_error("assign partitions", e))?;
                }

                let mut out = Vec::new();
                let mut next = consumer.poll(wait);
                while let Some(res) = next {
                    match res {
                        Ok(msg) => out.push(to_record(&msg)),
                        Err(e) if out.is_empty() => return Err(client_error("poll", e)),
                        Err(e) => {
                            tracing::warn!(error = %e, drained = out.len(), "poll error after partial batch");
                            break;
                        }
                    }
                    if out.len() >= max {
                        break;
                    }
                    next = consumer.poll(Duration::ZERO);
                }
                Ok(out)
            })
            .await
        })
    }

    fn close(&mut self) {
        if self.consumer.take().is_some() {
            tracing::debug!(topic = ?self.topic, "read session closed");
        }
    }
}

/// Copy a polled message into an owned record. Headers keep wire order.
pub(crate) fn to_record<M: Message>(msg: &M) -> BrokerRecord {
    let headers = msg
        .headers()
        .map(|hs| {
            hs.iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default();

    BrokerRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        timestamp: msg.timestamp().to_millis().unwrap_or(-1),
        key: msg.key().map(<[u8]>::to_vec),
        value: msg.payload().map(<[u8]>::to_vec),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage};
    use rdkafka::Timestamp;

    #[test]
    fn group_ids_are_unique() {
        let a = reader_group_id();
        let b = reader_group_id();
        assert_ne!(a, b);
        assert!(a.starts_with("dlq-reader-"));
    }

    #[test]
    fn message_to_record() {
        let headers = OwnedHeaders::new()
            .insert(Header { key: "content-type", value: Some("text/plain") })
            .insert(Header { key: "x-null", value: None::<&[u8]> })
            .insert(Header { key: "content-type", value: Some("text/html") });
        let msg = OwnedMessage::new(
            Some(b"payload".to_vec()),
            Some(b"k1".to_vec()),
            "orders-DLQ".into(),
            Timestamp::CreateTime(1_700_000_000_123),
            2,
            41,
            Some(headers),
        );

        let record = to_record(&msg);
        assert_eq!(record.topic, "orders-DLQ");
        assert_eq!(record.partition, 2);
        assert_eq!(record.offset, 41);
        assert_eq!(record.timestamp, 1_700_000_000_123);
        assert_eq!(record.key.as_deref(), Some(&b"k1"[..]));
        assert_eq!(record.value.as_deref(), Some(&b"payload"[..]));
        assert_eq!(
            record.headers,
            vec![
                ("content-type".to_string(), Some(b"text/plain".to_vec())),
                ("x-null".to_string(), None),
                ("content-type".to_string(), Some(b"text/html".to_vec())),
            ]
        );
    }

    #[test]
    fn missing_timestamp_and_headers() {
        let msg = OwnedMessage::new(None, None, "t".into(), Timestamp::NotAvailable, 0, 0, None);
        let record = to_record(&msg);
        assert_eq!(record.timestamp, -1);
        assert!(record.value.is_none());
        assert!(record.headers.is_empty());
    }
}
