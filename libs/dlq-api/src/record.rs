use crate::headers::HeaderMap;

/// A record as polled from the broker. Key, value and header bytes are opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    /// Partition-local, monotonically increasing.
    pub offset: i64,
    /// Broker-assigned timestamp in milliseconds.
    pub timestamp: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    /// Headers in wire order. Names may repeat and values may be null.
    pub headers: Vec<(String, Option<Vec<u8>>)>,
}

/// A message handed to a write session for publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub key: Option<Vec<u8>>,
    /// `None` publishes a null payload.
    pub value: Option<Vec<u8>>,
    pub headers: HeaderMap<Vec<u8>>,
}

/// Broker acknowledgment for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// One entry of a broker topic listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicListing {
    pub name: String,
    /// Broker-internal topic (e.g. `__consumer_offsets`).
    pub internal: bool,
}
