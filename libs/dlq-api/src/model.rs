use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::headers::HeaderMap;

/// Client-facing view of a fetched record.
///
/// `key_utf8` / `value_utf8` are present only when the bytes look like text.
/// `value_base64` is present iff the record has a value; `headers` carry
/// base64 values in broker order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub key_utf8: Option<String>,
    pub value_utf8: Option<String>,
    pub value_base64: Option<String>,
    pub headers: HeaderMap<String>,
}

/// A client-supplied, ordered batch of records to re-publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayBatch {
    /// Informational only.
    #[serde(default)]
    pub source_topic: Option<String>,
    #[serde(default)]
    pub target_topic: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<ReplayItem>>,
    /// Records per second. Ignored unless positive.
    #[serde(default)]
    pub throttle_per_sec: Option<i64>,
    /// Replaces the configured header allow-list when present.
    #[serde(default)]
    pub header_allow_list: Option<HashSet<String>>,
}

impl ReplayBatch {
    pub fn items(&self) -> &[ReplayItem] {
        self.items.as_deref().unwrap_or_default()
    }
}

/// One record of a replay batch.
///
/// `partition` and `offset` describe where the record came from; they never
/// pick the publish partition. A missing `value_base64` is a null payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayItem {
    #[serde(default)]
    pub partition: i32,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub value_base64: Option<String>,
    #[serde(default)]
    pub headers_base64: Option<HeaderMap<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_batch_accepts_client_payload() {
        let json = r#"{
            "sourceTopic": "orders-DLQ",
            "targetTopic": "orders",
            "throttlePerSec": 20,
            "headerAllowList": ["content-type"],
            "items": [
                {"partition": 1, "offset": 42, "valueBase64": "eyJvayI6dHJ1ZX0=",
                 "headersBase64": {"content-type": "YXBwbGljYXRpb24vanNvbg=="}},
                {"partition": 0, "offset": 7}
            ]
        }"#;
        let batch: ReplayBatch = serde_json::from_str(json).unwrap();

        assert_eq!(batch.target_topic.as_deref(), Some("orders"));
        assert_eq!(batch.throttle_per_sec, Some(20));
        assert_eq!(batch.items().len(), 2);
        assert_eq!(batch.items()[1].value_base64, None);
        assert!(batch.items()[1].headers_base64.is_none());
    }

    #[test]
    fn replay_batch_tolerates_null_items() {
        let batch: ReplayBatch =
            serde_json::from_str(r#"{"targetTopic":"t","items":null}"#).unwrap();
        assert!(batch.items().is_empty());
    }

    #[test]
    fn fetched_record_uses_client_field_names() {
        let rec = FetchedRecord {
            topic: "t".into(),
            partition: 0,
            offset: 5,
            timestamp: 1_700_000_000_000,
            key_utf8: None,
            value_utf8: Some("v".into()),
            value_base64: Some("dg==".into()),
            headers: HeaderMap::new(),
        };
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["valueUtf8"], "v");
        assert_eq!(value["valueBase64"], "dg==");
        assert!(value["keyUtf8"].is_null());
    }
}
