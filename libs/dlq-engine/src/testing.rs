//! In-memory broker for tests.
//!
//! Implements every broker seam over plain vectors. Records which sessions
//! were opened and released, every seek, and every published message, and
//! lets tests inject metadata, offset and publish failures or latency.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dlq_api::broker::{BrokerAdmin, BrokerFuture, ReadSession, SessionFactory, WriteSession};
use dlq_api::error::BrokerError;
use dlq_api::record::{BrokerRecord, Delivery, OutboundMessage, TopicListing};

type PublishHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Session counters. A session is released exactly once, by `close()` or by drop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub readers_opened: usize,
    pub readers_released: usize,
    pub writers_opened: usize,
    pub writers_released: usize,
}

#[derive(Default)]
struct Partition {
    begin: i64,
    /// Records with offsets `begin..begin + records.len()`.
    records: Vec<BrokerRecord>,
    /// Offsets below this were deleted by retention.
    retained_from: i64,
}

impl Partition {
    fn end(&self) -> i64 {
        self.begin + self.records.len() as i64
    }
}

#[derive(Default)]
struct State {
    topics: BTreeMap<String, Vec<Partition>>,
    internal: HashSet<String>,
    fail_metadata: Option<BrokerError>,
    fail_offsets: bool,
    offsets_delay: Duration,
    poll_batch: usize,
    poll_delay: Duration,
    polls: usize,
    seeks: Vec<(i32, i64)>,
    fail_publish: HashSet<usize>,
    publish_delay: Duration,
    publish_attempts: usize,
    published: Vec<(String, OutboundMessage)>,
    on_publish: Option<PublishHook>,
    stats: SessionStats,
}

/// Scripted in-memory broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    match state.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let state = State {
            poll_batch: 500,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn create_topic(&self, name: &str, partitions: u32) {
        let parts = (0..partitions).map(|_| Partition::default()).collect();
        self.state().topics.insert(name.to_string(), parts);
    }

    pub fn create_internal_topic(&self, name: &str) {
        self.create_topic(name, 1);
        self.state().internal.insert(name.to_string());
    }

    /// Append a record with the given value. Returns its offset.
    pub fn append(&self, topic: &str, partition: i32, value: &[u8]) -> i64 {
        self.append_with(topic, partition, None, Some(value.to_vec()), Vec::new())
    }

    /// Append a fully specified record. Returns its offset.
    pub fn append_with(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
        headers: Vec<(String, Option<Vec<u8>>)>,
    ) -> i64 {
        let mut state = self.state();
        let part = state
            .topics
            .get_mut(topic)
            .and_then(|p| p.get_mut(partition as usize))
            .unwrap_or_else(|| panic!("no partition {topic}/{partition}"));
        let offset = part.end();
        part.records.push(BrokerRecord {
            topic: topic.to_string(),
            partition,
            offset,
            timestamp: 1_700_000_000_000 + offset,
            key,
            value,
            headers,
        });
        offset
    }

    /// Simulate retention: offsets below `offset` are no longer readable.
    pub fn delete_before(&self, topic: &str, partition: i32, offset: i64) {
        let mut state = self.state();
        if let Some(part) = state.topics.get_mut(topic).and_then(|p| p.get_mut(partition as usize)) {
            part.retained_from = offset;
        }
    }

    /// Start a partition at `offset` instead of 0.
    pub fn set_base_offset(&self, topic: &str, partition: i32, offset: i64) {
        let mut state = self.state();
        if let Some(part) = state.topics.get_mut(topic).and_then(|p| p.get_mut(partition as usize)) {
            assert!(part.records.is_empty(), "base offset must be set before appending");
            part.begin = offset;
            part.retained_from = offset;
        }
    }

    /// Maximum records returned by one poll.
    pub fn set_poll_batch(&self, n: usize) {
        self.state().poll_batch = n.max(1);
    }

    /// Simulated broker latency added to every poll.
    pub fn set_poll_delay(&self, delay: Duration) {
        self.state().poll_delay = delay;
    }

    /// Simulated latency of every offset lookup.
    pub fn set_offsets_delay(&self, delay: Duration) {
        self.state().offsets_delay = delay;
    }

    /// Simulated acknowledgment wait of every publish. The attempt is counted
    /// when the publish starts; the message is recorded once the wait ends.
    pub fn set_publish_delay(&self, delay: Duration) {
        self.state().publish_delay = delay;
    }

    pub fn fail_metadata(&self, error: BrokerError) {
        self.state().fail_metadata = Some(error);
    }

    pub fn fail_offsets(&self) {
        self.state().fail_offsets = true;
    }

    /// Fail the n-th publish attempt (1-based).
    pub fn fail_publish_attempt(&self, attempt: usize) {
        self.state().fail_publish.insert(attempt);
    }

    /// Called after every acknowledged publish with the number acknowledged so far.
    pub fn on_publish(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        self.state().on_publish = Some(Arc::new(hook));
    }

    pub fn published(&self) -> Vec<(String, OutboundMessage)> {
        self.state().published.clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.state().publish_attempts
    }

    pub fn seeks(&self) -> Vec<(i32, i64)> {
        self.state().seeks.clone()
    }

    pub fn polls(&self) -> usize {
        self.state().polls
    }

    pub fn stats(&self) -> SessionStats {
        self.state().stats
    }
}

impl BrokerAdmin for MemoryBroker {
    fn list_topics(&self) -> BrokerFuture<'_, Vec<TopicListing>> {
        Box::pin(async move {
            let state = self.state();
            if let Some(e) = &state.fail_metadata {
                return Err(BrokerError { kind: e.kind, message: e.message.clone() });
            }
            Ok(state
                .topics
                .keys()
                .map(|name| TopicListing {
                    name: name.clone(),
                    internal: state.internal.contains(name),
                })
                .collect())
        })
    }

    fn partition_count<'a>(&'a self, topic: &'a str) -> BrokerFuture<'a, Option<u32>> {
        Box::pin(async move {
            let state = self.state();
            if let Some(e) = &state.fail_metadata {
                return Err(BrokerError { kind: e.kind, message: e.message.clone() });
            }
            Ok(state.topics.get(topic).map(|p| p.len() as u32))
        })
    }
}

impl SessionFactory for MemoryBroker {
    fn open_reader(&self) -> BrokerFuture<'_, Box<dyn ReadSession>> {
        Box::pin(async move {
            self.state().stats.readers_opened += 1;
            Ok(Box::new(MemoryReadSession {
                state: self.state.clone(),
                topic: None,
                positions: BTreeMap::new(),
                released: false,
            }) as Box<dyn ReadSession>)
        })
    }

    fn open_writer(&self) -> BrokerFuture<'_, Box<dyn WriteSession>> {
        Box::pin(async move {
            self.state().stats.writers_opened += 1;
            Ok(Box::new(MemoryWriteSession {
                state: self.state.clone(),
                released: false,
            }) as Box<dyn WriteSession>)
        })
    }
}

// ---------------------------------------------------------------------------
// Read session
// ---------------------------------------------------------------------------

struct MemoryReadSession {
    state: Arc<Mutex<State>>,
    topic: Option<String>,
    /// Next offset to read per assigned partition.
    positions: BTreeMap<i32, i64>,
    released: bool,
}

impl MemoryReadSession {
    async fn offsets(&self, partitions: &[i32], end: bool) -> Result<HashMap<i32, i64>, BrokerError> {
        let delay = lock(&self.state).offsets_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.state);
        if state.fail_offsets {
            return Err(BrokerError::timeout("list offsets timed out"));
        }
        let topic = self
            .topic
            .as_ref()
            .ok_or_else(|| BrokerError::not_assigned("offsets requested before assign"))?;
        let parts = state
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::unavailable(format!("unknown topic {topic}")))?;
        partitions
            .iter()
            .map(|&p| {
                let part = parts
                    .get(p as usize)
                    .ok_or_else(|| BrokerError::unavailable(format!("unknown partition {p}")))?;
                let offset = if end { part.end() } else { part.retained_from.max(part.begin) };
                Ok((p, offset))
            })
            .collect()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            lock(&self.state).stats.readers_released += 1;
        }
    }
}

impl ReadSession for MemoryReadSession {
    fn assign<'a>(&'a mut self, topic: &'a str, partitions: &'a [i32]) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.topic = Some(topic.to_string());
            self.positions = partitions.iter().map(|&p| (p, 0)).collect();
            Ok(())
        })
    }

    fn beginning_offsets<'a>(
        &'a mut self,
        partitions: &'a [i32],
    ) -> BrokerFuture<'a, HashMap<i32, i64>> {
        Box::pin(self.offsets(partitions, false))
    }

    fn end_offsets<'a>(&'a mut self, partitions: &'a [i32]) -> BrokerFuture<'a, HashMap<i32, i64>> {
        Box::pin(self.offsets(partitions, true))
    }

    fn seek(&mut self, partition: i32, offset: i64) -> Result<(), BrokerError> {
        let pos = self
            .positions
            .get_mut(&partition)
            .ok_or_else(|| BrokerError::not_assigned(format!("partition {partition} not assigned")))?;
        *pos = offset;
        lock(&self.state).seeks.push((partition, offset));
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> BrokerFuture<'_, Vec<BrokerRecord>> {
        Box::pin(async move {
            let (batch, delay) = {
                let mut state = lock(&self.state);
                state.polls += 1;
                let topic = self
                    .topic
                    .as_ref()
                    .ok_or_else(|| BrokerError::not_assigned("poll before assign"))?;
                let limit = state.poll_batch;
                let mut batch = Vec::new();
                if let Some(parts) = state.topics.get(topic) {
                    for (&p, pos) in self.positions.iter_mut() {
                        let Some(part) = parts.get(p as usize) else { continue };
                        *pos = (*pos).max(part.retained_from);
                        while batch.len() < limit && *pos < part.end() {
                            let idx = (*pos - part.begin) as usize;
                            batch.push(part.records[idx].clone());
                            *pos += 1;
                        }
                    }
                }
                (batch, state.poll_delay)
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if batch.is_empty() {
                tokio::time::sleep(wait).await;
            }
            Ok(batch)
        })
    }

    fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryReadSession {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Write session
// ---------------------------------------------------------------------------

struct MemoryWriteSession {
    state: Arc<Mutex<State>>,
    released: bool,
}

impl MemoryWriteSession {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            lock(&self.state).stats.writers_released += 1;
        }
    }
}

impl WriteSession for MemoryWriteSession {
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        message: OutboundMessage,
    ) -> BrokerFuture<'a, Delivery> {
        Box::pin(async move {
            let (attempt, delay) = {
                let mut state = lock(&self.state);
                state.publish_attempts += 1;
                (state.publish_attempts, state.publish_delay)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let (result, hook) = {
                let mut state = lock(&self.state);
                if state.fail_publish.contains(&attempt) {
                    (Err(BrokerError::rejected(format!("publish attempt {attempt} rejected"))), None)
                } else {
                    state.published.push((topic.to_string(), message));
                    let acked = state.published.len();
                    let delivery = Delivery {
                        partition: 0,
                        offset: acked as i64 - 1,
                    };
                    (Ok(delivery), state.on_publish.clone().map(|h| (h, acked)))
                }
            };
            if let Some((hook, acked)) = hook {
                hook(acked);
            }
            result
        })
    }

    fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryWriteSession {
    fn drop(&mut self) {
        self.release();
    }
}
