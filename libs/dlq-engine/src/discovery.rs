use std::sync::Arc;

use regex::Regex;

use dlq_api::broker::BrokerAdmin;

use crate::config::DiscoveryConfig;
use crate::error::DlqError;

/// Lists dead-letter topics by name pattern.
pub struct TopicDiscovery {
    admin: Arc<dyn BrokerAdmin>,
    /// Anchored at both ends: the whole name must match.
    pattern: Regex,
}

impl TopicDiscovery {
    pub fn new(admin: Arc<dyn BrokerAdmin>, config: &DiscoveryConfig) -> Result<Self, DlqError> {
        let pattern = Regex::new(&format!("^(?:{})$", config.pattern))
            .map_err(|e| DlqError::Config(format!("discovery.pattern: {e}")))?;
        Ok(Self { admin, pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// Non-internal topics whose full name matches the pattern, sorted.
    ///
    /// A failed or timed-out metadata call fails the whole listing with
    /// [`DlqError::BrokerUnavailable`].
    pub async fn list_dead_letter_topics(&self) -> Result<Vec<String>, DlqError> {
        let listing = self
            .admin
            .list_topics()
            .await
            .map_err(|e| DlqError::BrokerUnavailable(format!("list topics: {e}")))?;
        let total = listing.len();

        let mut topics: Vec<String> = listing
            .into_iter()
            .filter(|t| !t.internal && self.matches(&t.name))
            .map(|t| t.name)
            .collect();
        topics.sort();

        tracing::debug!(total, matched = topics.len(), pattern = %self.pattern, "listed dead-letter topics");
        Ok(topics)
    }
}
