use std::{thread, time::Duration};

use futures::StreamExt;
use shared::{LogEvent, Severity};

use super::*;

const STEP: Duration = Duration::from_secs(2);

fn log(severity: Severity, timestamp_ms: i64) -> LogEvent {
    LogEvent::new(severity, format!("{severity} at {timestamp_ms}")).at(timestamp_ms)
}

fn severities(events: &[Arc<LogEvent>]) -> Vec<Severity> {
    events.iter().map(|event| event.severity).collect()
}

#[test]
fn appends_keep_arrival_order_and_views_do_not_reorder_store() {
    let store = EventStore::new("logs");
    store.append(log(Severity::Info, 100));
    store.append(log(Severity::Error, 200));
    store.append(log(Severity::Debug, 300));

    let snapshot = store.snapshot();
    assert_eq!(
        severities(&snapshot.sorted(SortOrder::Descending)),
        vec![Severity::Debug, Severity::Error, Severity::Info]
    );
    assert_eq!(
        severities(&snapshot.sorted(SortOrder::Ascending)),
        vec![Severity::Info, Severity::Error, Severity::Debug]
    );
    assert_eq!(
        severities(store.snapshot().as_slice()),
        vec![Severity::Info, Severity::Error, Severity::Debug]
    );

    store.clear();
    assert!(store.snapshot().is_empty());
}

#[test]
fn descending_sort_is_stable_for_equal_timestamps() {
    let store = EventStore::new("logs");
    store.append(log(Severity::Info, 5));
    store.append(log(Severity::Warn, 5));
    store.append(log(Severity::Error, 9));

    assert_eq!(
        severities(&store.snapshot().sorted(SortOrder::Descending)),
        vec![Severity::Error, Severity::Info, Severity::Warn]
    );
    assert_eq!(
        severities(&store.snapshot().newest_first()),
        vec![Severity::Error, Severity::Warn, Severity::Info]
    );
}

#[test]
fn snapshot_is_point_in_time() {
    let store = EventStore::new("analytics");
    store.append(log(Severity::Info, 1));
    let before = store.snapshot();
    store.append(log(Severity::Info, 2));
    store.clear();

    assert_eq!(before.len(), 1);
    assert_eq!(before.revision(), 1);
    assert_eq!(store.revision(), 3);
    assert!(store.is_empty());
}

#[test]
fn appends_after_clear_survive_and_earlier_ones_do_not_resurrect() {
    let store = EventStore::new("logs");
    for ts in 0..10 {
        store.append(log(Severity::Verbose, ts));
    }
    store.clear();
    for ts in 10..13 {
        store.append(log(Severity::Info, ts));
    }

    let timestamps: Vec<i64> = store
        .snapshot()
        .iter()
        .map(|event| event.timestamp_ms)
        .collect();
    assert_eq!(timestamps, vec![10, 11, 12]);
}

#[test]
fn concurrent_producers_lose_nothing() {
    let store = Arc::new(EventStore::new("logs"));
    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..250 {
                    store.append(log(Severity::Debug, producer * 1_000 + i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2_000);
    assert_eq!(snapshot.revision(), 2_000);

    // Each producer's own appends stay in program order.
    for producer in 0..8_i64 {
        let own: Vec<i64> = snapshot
            .iter()
            .map(|event| event.timestamp_ms)
            .filter(|ts| ts / 1_000 == producer)
            .collect();
        let mut sorted = own.clone();
        sorted.sort_unstable();
        assert_eq!(own, sorted);
    }
}

#[test]
fn clear_racing_producers_keeps_exactly_the_post_clear_suffix() {
    let store = Arc::new(EventStore::new("network"));
    let mut changes = store.subscribe();

    let producer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..500 {
                store.append(log(Severity::Info, i));
            }
        })
    };
    thread::sleep(Duration::from_millis(1));
    store.clear();
    producer.join().expect("producer thread");

    // Replay the change feed: the final state must equal the appends sequenced after the clear.
    let mut replayed: Vec<i64> = Vec::new();
    while let Ok(change) = changes.try_recv() {
        match change {
            StoreChange::Appended { event, .. } => replayed.push(event.timestamp_ms),
            StoreChange::Cleared { .. } => replayed.clear(),
        }
    }
    let actual: Vec<i64> = store
        .snapshot()
        .iter()
        .map(|event| event.timestamp_ms)
        .collect();
    assert_eq!(actual, replayed);
}

#[test]
fn change_feed_revisions_are_strictly_increasing() {
    let store = EventStore::new("logs");
    let mut changes = store.subscribe();
    store.append(log(Severity::Info, 1));
    store.clear();
    store.append(log(Severity::Warn, 2));

    let revisions: Vec<u64> = std::iter::from_fn(|| changes.try_recv().ok())
        .map(|change| change.revision())
        .collect();
    assert_eq!(revisions, vec![1, 2, 3]);
}

#[tokio::test]
async fn observe_starts_with_current_state_and_follows_changes() {
    let store = Arc::new(EventStore::new("logs"));
    store.append(log(Severity::Info, 1));

    let mut snapshots = Box::pin(store.observe());
    let first = tokio::time::timeout(STEP, snapshots.next())
        .await
        .expect("initial snapshot")
        .expect("stream open");
    assert_eq!(first.len(), 1);

    store.append(log(Severity::Error, 2));
    let second = tokio::time::timeout(STEP, snapshots.next())
        .await
        .expect("update")
        .expect("stream open");
    assert_eq!(second.len(), 2);
    assert!(second.revision() > first.revision());

    store.clear();
    let third = tokio::time::timeout(STEP, snapshots.next())
        .await
        .expect("clear")
        .expect("stream open");
    assert!(third.is_empty());
}

#[tokio::test]
async fn observe_batches_queued_changes_into_latest_state() {
    let store = Arc::new(EventStore::with_change_capacity("logs", 4));
    let mut snapshots = Box::pin(store.observe());
    let initial = snapshots.next().await.expect("initial");
    assert!(initial.is_empty());

    // Overflow the change channel; the observer must still converge on the latest state.
    for ts in 0..20 {
        store.append(log(Severity::Debug, ts));
    }
    let latest = tokio::time::timeout(STEP, snapshots.next())
        .await
        .expect("converged snapshot")
        .expect("stream open");
    assert_eq!(latest.len(), 20);
    assert_eq!(latest.revision(), 20);
}

#[test]
fn snapshot_serializes_as_plain_sequence() {
    let store = EventStore::new("logs");
    store.append(LogEvent::new(Severity::Warn, "disk low").with_tag("fs").at(7));
    let json = serde_json::to_value(store.snapshot()).expect("json");
    assert_eq!(json[0]["severity"], "WARN");
    assert_eq!(json[0]["tag"], "fs");
    assert_eq!(json[0]["timestamp_ms"], 7);
}
