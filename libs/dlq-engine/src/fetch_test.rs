//! Tail fetch tests: windows, limits, ordering, deadline, cancellation, session release.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dlq_api::error::BrokerError;
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::error::DlqError;
use crate::fetch::{windows, FetchWindow, TailFetcher};
use crate::testing::{MemoryBroker, SessionStats};

fn fetcher(broker: &MemoryBroker, config: FetchConfig) -> TailFetcher {
    TailFetcher::new(Arc::new(broker.clone()), Arc::new(broker.clone()), config)
}

fn offsets(records: &[dlq_api::model::FetchedRecord]) -> Vec<i64> {
    records.iter().map(|r| r.offset).collect()
}

fn all_released(stats: SessionStats) -> bool {
    stats.readers_opened == stats.readers_released
}

// ============================================================================
// Fetch window
// ============================================================================

#[test]
fn window_seeks_to_last_n() {
    let w = FetchWindow::new(0, 100, 105, 3);
    assert_eq!(w.start, 102);
    assert_eq!(w.len(), 3);
}

#[test]
fn window_never_goes_below_begin() {
    let w = FetchWindow::new(0, 100, 105, 50);
    assert_eq!(w.start, 100);

    let empty = FetchWindow::new(1, 7, 7, 10);
    assert_eq!(empty.start, 7);
    assert_eq!(empty.len(), 0);
}

#[test]
fn window_stays_within_bounds() {
    for begin in [0i64, 3, 100] {
        for len in [0i64, 1, 5, 40] {
            for count in [1usize, 2, 5, 5000] {
                let end = begin + len;
                let w = FetchWindow::new(0, begin, end, count);
                assert!(w.begin <= w.start && w.start <= w.end, "{w:?}");
                assert_eq!(w.start, begin.max(end - count as i64));
            }
        }
    }
}

#[test]
fn missing_offsets_is_broker_error() {
    let begins = HashMap::from([(0, 0)]);
    let ends = HashMap::from([(0, 10), (1, 10)]);
    let err = windows(&[0, 1], &begins, &ends, 5).unwrap_err();
    assert!(matches!(err, DlqError::BrokerUnavailable(_)));
}

// ============================================================================
// Seek and limits
// ============================================================================

#[tokio::test(start_paused = true)]
async fn limit_three_seeks_to_offset_102() {
    let broker = MemoryBroker::new();
    broker.create_topic("orders-DLQ", 1);
    broker.set_base_offset("orders-DLQ", 0, 100);
    for i in 0..5 {
        broker.append("orders-DLQ", 0, format!("m{i}").as_bytes());
    }

    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("orders-DLQ", Some(3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(broker.seeks(), vec![(0, 102)]);
    assert_eq!(offsets(&records), vec![104, 103, 102]);
    assert_eq!(records[0].value_utf8.as_deref(), Some("m4"));
}

#[tokio::test(start_paused = true)]
async fn retention_moves_begin_offset() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    for _ in 0..10 {
        broker.append("t-DLQ", 0, b"x");
    }
    broker.delete_before("t-DLQ", 0, 8);

    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", Some(5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(broker.seeks(), vec![(0, 8)]);
    assert_eq!(offsets(&records), vec![9, 8]);
}

#[tokio::test(start_paused = true)]
async fn limit_above_ceiling_behaves_like_ceiling() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    for _ in 0..10 {
        broker.append("t-DLQ", 0, b"x");
    }
    let config = FetchConfig {
        default_limit: 2,
        max_limit: 4,
        ..FetchConfig::default()
    };
    let f = fetcher(&broker, config);
    let cancel = CancellationToken::new();

    let over = f.fetch_last("t-DLQ", Some(10_000), &cancel).await.unwrap();
    let exact = f.fetch_last("t-DLQ", Some(4), &cancel).await.unwrap();

    assert_eq!(offsets(&over), vec![9, 8, 7, 6]);
    assert_eq!(over, exact);
    assert_eq!(broker.seeks(), vec![(0, 6), (0, 6)]);
}

#[tokio::test(start_paused = true)]
async fn non_positive_limit_uses_default() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    for _ in 0..10 {
        broker.append("t-DLQ", 0, b"x");
    }
    let config = FetchConfig {
        default_limit: 3,
        ..FetchConfig::default()
    };
    let f = fetcher(&broker, config);

    let records = f.fetch_last("t-DLQ", Some(0), &CancellationToken::new()).await.unwrap();
    assert_eq!(offsets(&records), vec![9, 8, 7]);

    let records = f.fetch_last("t-DLQ", None, &CancellationToken::new()).await.unwrap();
    assert_eq!(records.len(), 3);
}

// ============================================================================
// Partitions and ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn missing_topic_opens_no_session() {
    let broker = MemoryBroker::new();
    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("nope-DLQ", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(broker.stats().readers_opened, 0);
    assert_eq!(broker.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_partitions_opens_no_session() {
    let broker = MemoryBroker::new();
    broker.create_topic("empty-DLQ", 0);

    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("empty-DLQ", Some(10), &CancellationToken::new())
        .await
        .unwrap();

    assert!(records.is_empty());
    assert_eq!(broker.stats(), SessionStats::default());
}

#[tokio::test(start_paused = true)]
async fn results_sorted_by_offset_across_partitions() {
    let broker = MemoryBroker::new();
    broker.create_topic("mixed-DLQ", 3);
    for _ in 0..4 {
        broker.append("mixed-DLQ", 0, b"p0");
    }
    broker.set_base_offset("mixed-DLQ", 1, 50);
    for _ in 0..2 {
        broker.append("mixed-DLQ", 1, b"p1");
    }
    broker.set_base_offset("mixed-DLQ", 2, 20);
    for _ in 0..3 {
        broker.append("mixed-DLQ", 2, b"p2");
    }

    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("mixed-DLQ", Some(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(offsets(&records), vec![51, 50, 22, 21, 3, 2]);
    assert!(records.windows(2).all(|w| w[0].offset >= w[1].offset));
    let partitions: Vec<i32> = records.iter().map(|r| r.partition).collect();
    assert_eq!(partitions, vec![1, 1, 2, 2, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn short_partition_under_contributes() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 2);
    for _ in 0..10 {
        broker.append("t-DLQ", 0, b"x");
    }
    broker.append("t-DLQ", 1, b"y");

    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", Some(5), &CancellationToken::new())
        .await
        .unwrap();

    // 5 from partition 0, 1 from partition 1; the drain waits out the deadline
    // for the missing 4.
    assert_eq!(records.len(), 6);
    assert_eq!(records.iter().filter(|r| r.partition == 1).count(), 1);
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deadline_returns_partial_result() {
    let broker = MemoryBroker::new();
    broker.create_topic("slow-DLQ", 1);
    for _ in 0..10 {
        broker.append("slow-DLQ", 0, b"x");
    }
    broker.set_poll_batch(1);
    broker.set_poll_delay(Duration::from_millis(400));

    let started = tokio::time::Instant::now();
    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("slow-DLQ", Some(10), &CancellationToken::new())
        .await
        .unwrap();

    // polls finish at 400, 800, 1200 and 1600 ms; the 1500 ms deadline stops the loop
    assert_eq!(records.len(), 4);
    assert_eq!(broker.polls(), 4);
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert!(all_released(broker.stats()));
}

#[tokio::test(start_paused = true)]
async fn idle_topic_polls_until_deadline() {
    let broker = MemoryBroker::new();
    broker.create_topic("idle-DLQ", 2);

    let started = tokio::time::Instant::now();
    let records = fetcher(&broker, FetchConfig::default())
        .fetch_last("idle-DLQ", None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(records.is_empty());
    let took = started.elapsed();
    assert!(took >= Duration::from_millis(1500) && took < Duration::from_millis(1600));
    // 100 ms waits inside a 1500 ms budget
    assert_eq!(broker.polls(), 15);
    assert_eq!(broker.stats().readers_released, 1);
}

// ============================================================================
// Errors and release
// ============================================================================

#[tokio::test(start_paused = true)]
async fn blank_topic_is_invalid_request() {
    let broker = MemoryBroker::new();
    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("  ", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DlqError::InvalidRequest(_)));
    assert_eq!(broker.stats().readers_opened, 0);
}

#[tokio::test(start_paused = true)]
async fn metadata_failure_propagates() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    broker.fail_metadata(BrokerError::unavailable("connection refused"));

    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DlqError::BrokerUnavailable(ref m) if m.contains("connection refused")));
    assert_eq!(broker.stats().readers_opened, 0);
}

#[tokio::test(start_paused = true)]
async fn offset_failure_releases_session() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    broker.append("t-DLQ", 0, b"x");
    broker.fail_offsets();

    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DlqError::Timeout(_)));
    let stats = broker.stats();
    assert_eq!(stats.readers_opened, 1);
    assert_eq!(stats.readers_released, 1);
    assert_eq!(broker.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_drain_reports_progress() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    for _ in 0..10 {
        broker.append("t-DLQ", 0, b"x");
    }
    broker.set_poll_batch(1);
    broker.set_poll_delay(Duration::from_millis(100));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", Some(10), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DlqError::Cancelled { completed: 2 }));
    assert!(all_released(broker.stats()));
}

#[tokio::test(start_paused = true)]
async fn cancel_during_offset_lookup_releases_session() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 2);
    broker.append("t-DLQ", 0, b"x");
    broker.set_offsets_delay(Duration::from_secs(1));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", Some(5), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DlqError::Cancelled { completed: 0 }));
    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(broker.seeks().is_empty());
    assert_eq!(broker.polls(), 0);
    let stats = broker.stats();
    assert_eq!(stats.readers_opened, 1);
    assert_eq!(stats.readers_released, 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start() {
    let broker = MemoryBroker::new();
    broker.create_topic("t-DLQ", 1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetcher(&broker, FetchConfig::default())
        .fetch_last("t-DLQ", None, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(broker.stats().readers_opened, 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_fetch_releases_session() {
    let broker = MemoryBroker::new();
    broker.create_topic("idle-DLQ", 1);
    let f = fetcher(&broker, FetchConfig::default());
    let cancel = CancellationToken::new();

    let res = tokio::time::timeout(
        Duration::from_millis(250),
        f.fetch_last("idle-DLQ", None, &cancel),
    )
    .await;

    assert!(res.is_err());
    let stats = broker.stats();
    assert_eq!(stats.readers_opened, 1);
    assert_eq!(stats.readers_released, 1);
}
