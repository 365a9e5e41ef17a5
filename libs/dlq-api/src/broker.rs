use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::BrokerError;
use crate::record::{BrokerRecord, Delivery, OutboundMessage, TopicListing};

/// Boxed future returned by the broker seams.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Cluster metadata.
pub trait BrokerAdmin: Send + Sync {
    /// All topic names known to the cluster, internal ones flagged.
    fn list_topics(&self) -> BrokerFuture<'_, Vec<TopicListing>>;

    /// Number of partitions of `topic`. `None` if the topic does not exist.
    fn partition_count<'a>(&'a self, topic: &'a str) -> BrokerFuture<'a, Option<u32>>;
}

/// Opens broker sessions. One session per engine call, never shared.
pub trait SessionFactory: Send + Sync {
    fn open_reader(&self) -> BrokerFuture<'_, Box<dyn ReadSession>>;

    fn open_writer(&self) -> BrokerFuture<'_, Box<dyn WriteSession>>;
}

/// Consumer-like session with manual partition assignment.
///
/// Dropping a session releases it; `close()` releases it eagerly.
pub trait ReadSession: Send {
    /// Assign the given partitions of `topic`, replacing any previous assignment.
    fn assign<'a>(&'a mut self, topic: &'a str, partitions: &'a [i32]) -> BrokerFuture<'a, ()>;

    /// Earliest available offset per partition, in one batched call.
    fn beginning_offsets<'a>(&'a mut self, partitions: &'a [i32])
        -> BrokerFuture<'a, HashMap<i32, i64>>;

    /// Log end offset per partition, in one batched call.
    fn end_offsets<'a>(&'a mut self, partitions: &'a [i32]) -> BrokerFuture<'a, HashMap<i32, i64>>;

    /// Position the read cursor of an assigned partition.
    fn seek(&mut self, partition: i32, offset: i64) -> Result<(), BrokerError>;

    /// Pull whatever is available, waiting at most `wait`. May return an empty batch.
    fn poll(&mut self, wait: Duration) -> BrokerFuture<'_, Vec<BrokerRecord>>;

    fn close(&mut self);
}

/// Publisher session.
pub trait WriteSession: Send {
    /// Publish and resolve once the broker acknowledged or refused the message.
    fn publish<'a>(&'a mut self, topic: &'a str, message: OutboundMessage)
        -> BrokerFuture<'a, Delivery>;

    fn close(&mut self);
}
