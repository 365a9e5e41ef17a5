//! Tail fetch engine.
//!
//! Returns the most recent records of every partition of a topic within a
//! wall-clock budget. One call = one read session:
//!
//! ```text
//! Init  → partition count from admin metadata (no session if zero)
//! Seek  → batched begin/end offsets, cursor at max(begin, end - n)
//! Drain → bounded polls until n × partitions records or the deadline
//! Done  → global sort by offset, descending
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dlq_api::broker::{BrokerAdmin, ReadSession, SessionFactory};
use dlq_api::model::FetchedRecord;

use crate::cancel::or_cancelled;
use crate::codec;
use crate::config::FetchConfig;
use crate::error::DlqError;

/// Read window of one partition, computed fresh on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub partition: i32,
    pub begin: i64,
    pub end: i64,
    /// `max(begin, end - count)`.
    pub start: i64,
}

impl FetchWindow {
    pub fn new(partition: i32, begin: i64, end: i64, count: usize) -> Self {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        let start = end.saturating_sub(count).max(begin);
        Self {
            partition,
            begin,
            end,
            start,
        }
    }

    /// Records available between the cursor and the end offset.
    pub(crate) fn len(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

/// Outcome counters of the drain phase.
struct DrainStats {
    polls: usize,
    hit_deadline: bool,
}

pub struct TailFetcher {
    admin: Arc<dyn BrokerAdmin>,
    sessions: Arc<dyn SessionFactory>,
    config: FetchConfig,
}

impl TailFetcher {
    pub fn new(
        admin: Arc<dyn BrokerAdmin>,
        sessions: Arc<dyn SessionFactory>,
        config: FetchConfig,
    ) -> Self {
        Self {
            admin,
            sessions,
            config,
        }
    }

    /// Fetch up to `limit` of the newest records from every partition of `topic`.
    ///
    /// A non-positive or absent `limit` uses the configured default; the
    /// effective value is capped at the configured ceiling. Reaching the
    /// deadline returns what was drained so far. Broker failures abort the
    /// call and are not retried.
    pub async fn fetch_last(
        &self,
        topic: &str,
        limit: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FetchedRecord>, DlqError> {
        if topic.trim().is_empty() {
            return Err(DlqError::InvalidRequest("topic must not be blank".into()));
        }

        let started = Instant::now();
        let deadline = started + self.config.deadline();
        let n = self.config.effective_limit(limit);

        tracing::info!(topic, requested = ?limit, limit = n, "fetch started");

        // ── Init ──
        let count = or_cancelled(cancel, 0, self.admin.partition_count(topic))
            .await
            .map_err(|e| e.with_context(format!("partitions of '{topic}'")))?;
        let partitions: Vec<i32> = match count {
            Some(c) if c > 0 => (0..c as i32).collect(),
            _ => {
                tracing::info!(topic, "topic has no partitions, nothing to fetch");
                return Ok(Vec::new());
            }
        };

        let mut session = or_cancelled(cancel, 0, self.sessions.open_reader())
            .await
            .map_err(|e| e.with_context("open read session"))?;

        let result = self
            .seek_and_drain(&mut *session, topic, &partitions, n, deadline, cancel)
            .await;
        session.close();

        let (mut records, stats) = result?;
        records.sort_by(|a, b| b.offset.cmp(&a.offset));

        if let (Some(newest), Some(oldest)) = (records.first(), records.last()) {
            tracing::debug!(topic, max_offset = newest.offset, min_offset = oldest.offset, "fetched range");
        }
        tracing::info!(
            topic,
            fetched = records.len(),
            partitions = partitions.len(),
            polls = stats.polls,
            hit_deadline = stats.hit_deadline,
            took_ms = started.elapsed().as_millis() as u64,
            "fetch finished"
        );

        Ok(records)
    }

    async fn seek_and_drain(
        &self,
        session: &mut dyn ReadSession,
        topic: &str,
        partitions: &[i32],
        n: usize,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(Vec<FetchedRecord>, DrainStats), DlqError> {
        // ── Seek ──
        or_cancelled(cancel, 0, session.assign(topic, partitions)).await?;
        let begins = or_cancelled(cancel, 0, session.beginning_offsets(partitions))
            .await
            .map_err(|e| e.with_context("beginning offsets"))?;
        let ends = or_cancelled(cancel, 0, session.end_offsets(partitions))
            .await
            .map_err(|e| e.with_context("end offsets"))?;

        for window in windows(partitions, &begins, &ends, n)? {
            tracing::debug!(
                topic,
                partition = window.partition,
                begin = window.begin,
                end = window.end,
                start = window.start,
                available = window.len(),
                "seek"
            );
            session.seek(window.partition, window.start)?;
        }

        // ── Drain ──
        // Upper bound across all partitions, not a per-partition quota.
        let target = n.saturating_mul(partitions.len());
        let poll_wait = self.config.poll_wait();
        let mut out = Vec::new();
        let mut polls = 0;

        loop {
            let now = Instant::now();
            if out.len() >= target || now >= deadline {
                break;
            }
            let wait = poll_wait.min(deadline - now);
            let batch = or_cancelled(cancel, out.len(), session.poll(wait)).await?;
            polls += 1;
            tracing::debug!(topic, poll = polls, records = batch.len(), "poll");
            out.extend(batch.into_iter().map(codec::to_fetched));
        }

        let hit_deadline = out.len() < target;
        Ok((out, DrainStats { polls, hit_deadline }))
    }
}

/// Build the read window of every partition from batched offset lookups.
pub fn windows(
    partitions: &[i32],
    begins: &HashMap<i32, i64>,
    ends: &HashMap<i32, i64>,
    count: usize,
) -> Result<Vec<FetchWindow>, DlqError> {
    partitions
        .iter()
        .map(|&p| {
            let (Some(&begin), Some(&end)) = (begins.get(&p), ends.get(&p)) else {
                return Err(DlqError::BrokerUnavailable(format!(
                    "broker returned no offsets for partition {p}"
                )));
            };
            Ok(FetchWindow::new(p, begin, end, count))
        })
        .collect()
}
