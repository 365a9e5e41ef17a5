//! Replay engine.
//!
//! Re-publishes a client-supplied batch to a target topic, in order, at a
//! fixed rate. Malformed payloads and failed publishes cost one item, never
//! the batch. A malformed allowed header aborts the batch. Cancellation is
//! observed during every acknowledgment wait and every rate delay.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dlq_api::broker::{SessionFactory, WriteSession};
use dlq_api::model::{ReplayBatch, ReplayItem};
use dlq_api::record::OutboundMessage;

use crate::cancel::or_cancelled;
use crate::codec;
use crate::config::ReplayConfig;
use crate::error::DlqError;

pub struct Replayer {
    sessions: Arc<dyn SessionFactory>,
    config: ReplayConfig,
}

impl Replayer {
    pub fn new(sessions: Arc<dyn SessionFactory>, config: ReplayConfig) -> Self {
        Self { sessions, config }
    }

    /// Publish every item of `batch` to its target topic.
    ///
    /// Returns the number of acknowledged publishes. Skipped and failed items
    /// are not counted. Cancellation returns [`DlqError::Cancelled`] carrying
    /// the count published so far.
    pub async fn replay(
        &self,
        batch: &ReplayBatch,
        cancel: &CancellationToken,
    ) -> Result<usize, DlqError> {
        let topic = match batch.target_topic.as_deref() {
            Some(t) if t.trim().is_empty() => {
                return Err(DlqError::InvalidRequest("targetTopic is required".into()));
            }
            Some(t) if t.trim() != t => {
                return Err(DlqError::InvalidRequest(format!(
                    "targetTopic '{t}' has surrounding whitespace"
                )));
            }
            Some(t) => t,
            None => return Err(DlqError::InvalidRequest("targetTopic is required".into())),
        };

        let items = batch.items();
        if items.is_empty() {
            tracing::info!(topic, "replay requested with no items, nothing to send");
            return Ok(0);
        }

        let rate = self.config.effective_rate(batch.throttle_per_sec);
        let interval = ReplayConfig::interval(rate);
        let allow = batch
            .header_allow_list
            .as_ref()
            .unwrap_or_else(|| self.config.header_allow_list.as_set());

        tracing::info!(
            topic,
            source = batch.source_topic.as_deref().unwrap_or("-"),
            items = items.len(),
            requested_rate = ?batch.throttle_per_sec,
            rate,
            interval_ms = interval.as_millis() as u64,
            "replay started"
        );

        let started = Instant::now();
        let mut published = 0;

        let result = match or_cancelled(cancel, 0, self.sessions.open_writer()).await {
            Ok(mut session) => {
                let result = publish_all(
                    &mut *session,
                    topic,
                    items,
                    allow,
                    interval,
                    cancel,
                    &mut published,
                )
                .await;
                session.close();
                result
            }
            Err(e) => Err(e.with_context("open write session")),
        };

        match &result {
            Err(DlqError::Cancelled { .. }) => {
                tracing::warn!(topic, published, "replay cancelled")
            }
            Err(e) => tracing::error!(topic, published, error = %e, "replay aborted"),
            Ok(_) => {}
        }
        tracing::info!(
            topic,
            published,
            total = items.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "replay finished"
        );

        result.map(|()| published)
    }
}

async fn publish_all(
    session: &mut dyn WriteSession,
    topic: &str,
    items: &[ReplayItem],
    allow: &HashSet<String>,
    interval: std::time::Duration,
    cancel: &CancellationToken,
    published: &mut usize,
) -> Result<(), DlqError> {
    for item in items {
        let value = match codec::decode_payload(item.value_base64.as_deref()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    partition = item.partition,
                    offset = item.offset,
                    error = %e,
                    "skipping item with invalid payload encoding"
                );
                continue;
            }
        };
        if value.is_none() {
            tracing::debug!(partition = item.partition, offset = item.offset, "item has null payload");
        }

        let headers = codec::filter_and_decode(item.headers_base64.as_ref(), allow)
            .map_err(|e| e.at_item(item.offset, *published))?;

        let message = OutboundMessage {
            key: None,
            value,
            headers,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DlqError::Cancelled { completed: *published });
            }
            res = session.publish(topic, message) => res,
        };
        match outcome {
            Ok(delivery) => {
                *published += 1;
                tracing::debug!(
                    partition = item.partition,
                    offset = item.offset,
                    delivered_partition = delivery.partition,
                    delivered_offset = delivery.offset,
                    "published"
                );
            }
            Err(e) => {
                tracing::error!(
                    partition = item.partition,
                    offset = item.offset,
                    error = %e,
                    "publish failed, continuing"
                );
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DlqError::Cancelled { completed: *published });
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}
