use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use serde::Deserialize;

/// `[kafka]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Bound on metadata and offset lookups.
    #[serde(default = "default_timeout_ms")]
    pub metadata_timeout_ms: u64,
    /// Bound on a single publish acknowledgment.
    #[serde(default = "default_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Records drained from the client queue by one poll.
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    /// Extra librdkafka properties, passed through verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".into()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_max_poll_records() -> usize {
    500
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            metadata_timeout_ms: default_timeout_ms(),
            ack_timeout_ms: default_timeout_ms(),
            max_poll_records: default_max_poll_records(),
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Base client configuration: bootstrap servers, then pass-through properties.
    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.bootstrap_servers);
        for (k, v) in &self.properties {
            cfg.set(k, v);
        }
        cfg
    }

    /// Consumer settings for a short-lived, non-committing reader.
    pub(crate) fn reader_config(&self, group_id: &str) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("isolation.level", "read_committed")
            .set("allow.auto.create.topics", "false")
            .set("enable.partition.eof", "false");
        cfg
    }

    pub(crate) fn writer_config(&self) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("message.timeout.ms", self.ack_timeout_ms.to_string())
            .set("acks", "all");
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: KafkaConfig = toml::from_str("").unwrap();
        assert_eq!(config.bootstrap_servers, "localhost:9092");
        assert_eq!(config.metadata_timeout(), Duration::from_secs(5));
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_poll_records, 500);
        assert!(config.properties.is_empty());
    }

    #[test]
    fn properties_pass_through() {
        let config: KafkaConfig = toml::from_str(
            r#"
            bootstrap_servers = "k1:9092,k2:9092"
            ack_timeout_ms = 750
            [properties]
            "security.protocol" = "SASL_SSL"
            "sasl.mechanism" = "PLAIN"
            "#,
        )
        .unwrap();

        let reader = config.reader_config("g1");
        assert_eq!(reader.get("bootstrap.servers"), Some("k1:9092,k2:9092"));
        assert_eq!(reader.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(reader.get("group.id"), Some("g1"));
        assert_eq!(reader.get("enable.auto.commit"), Some("false"));

        let writer = config.writer_config();
        assert_eq!(writer.get("message.timeout.ms"), Some("750"));
        assert_eq!(writer.get("sasl.mechanism"), Some("PLAIN"));
        assert_eq!(writer.get("group.id"), None);
    }
}
