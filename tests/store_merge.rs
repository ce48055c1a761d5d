use serde_json::json;

use scoutlog::{
    core::store::{MergeError, RecordStore},
    queue::ingest_channel,
    record::RawRecord,
    types::Source,
};

fn raw(ts: &str, rev: u64, team: &str, match_id: &str) -> RawRecord {
    json!({
        "timestamp": ts,
        "revision": rev,
        "team": team,
        "match": match_id,
        "alliance": "red",
        "noShow": false,
        "comments": "",
        "recorderName": "Ada",
    })
    .as_object()
    .cloned()
    .expect("object")
}

#[test]
fn later_revision_supersedes_earlier_one() {
    let (tx, mut queue) = ingest_channel();
    let mut store = RecordStore::new();

    tx.enqueue(raw("1000", 1, "118", "3"), "R1");
    tx.enqueue(raw("1000", 2, "119", "3"), "R1");
    let outcome = queue.drain_into(&mut store);

    assert_eq!(outcome.merged, 2);
    assert!(outcome.changed());
    let rows: Vec<_> = store.authoritative().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source.as_str(), "R1");
    assert_eq!(rows[0].timestamp, "1000");
    assert_eq!(rows[0].revision, 2);
    assert_eq!(rows[0].record.team().as_deref(), Some("119"));
    assert_eq!(store.record_count(), 2);
}

#[test]
fn resubmitting_a_revision_overwrites_in_place() {
    let mut store = RecordStore::new();
    let first = store.merge(raw("1000", 1, "118", "3"), Source::new("R1")).expect("merge");
    let second = store.merge(raw("1000", 1, "254", "3"), Source::new("R1")).expect("merge");

    assert!(!first.replaced);
    assert!(second.replaced);
    assert_eq!(store.record_count(), 1);
    let group = store.group("R1", "1000").expect("group");
    assert_eq!(group.len(), 1);
    assert_eq!(group.authoritative().map(|(_, r)| r.team()), Some(Some("254".to_string())));
}

#[test]
fn groups_are_keyed_by_source_and_timestamp() {
    let mut store = RecordStore::new();
    store.merge(raw("1000", 1, "118", "3"), Source::new("R1")).expect("merge");
    store.merge(raw("1000", 1, "254", "3"), Source::new("B1")).expect("merge");
    store.merge(raw("2000", 1, "118", "4"), Source::new("R1")).expect("merge");

    assert_eq!(store.group_count(), 3);
    let sources: Vec<_> = store.authoritative().map(|r| r.source.to_string()).collect();
    assert_eq!(sources, vec!["B1", "R1", "R1"]);
}

#[test]
fn numeric_and_string_timestamps_share_a_group() {
    let mut store = RecordStore::new();
    let mut numeric = raw("x", 1, "118", "3");
    numeric.insert("timestamp".into(), json!(1000));
    store.merge(numeric, Source::new("R1")).expect("merge");
    store.merge(raw("1000", 2, "119", "3"), Source::new("R1")).expect("merge");

    assert_eq!(store.group_count(), 1);
    assert_eq!(store.group("R1", "1000").map(|g| g.len()), Some(2));
}

#[test]
fn malformed_items_are_dropped_without_stopping_the_drain() {
    let (tx, mut queue) = ingest_channel();
    let mut store = RecordStore::new();

    let mut no_ts = raw("1000", 1, "118", "3");
    no_ts.remove("timestamp");
    let mut no_rev = raw("1001", 1, "118", "3");
    no_rev.remove("revision");
    let mut bad_rev = raw("1002", 1, "118", "3");
    bad_rev.insert("revision".into(), json!("2b"));

    tx.enqueue(no_ts, "R1");
    tx.enqueue(no_rev, "R1");
    tx.enqueue(bad_rev, "R1");
    tx.enqueue(raw("1003", 1, "118", "3"), "R1");

    let outcome = queue.drain_into(&mut store);
    assert_eq!(outcome.dropped, 3);
    assert_eq!(outcome.merged, 1);
    assert_eq!(store.group_count(), 1);
    assert!(queue.is_empty());
}

#[test]
fn merge_errors_name_the_problem() {
    let mut store = RecordStore::new();
    let mut bad = raw("1000", 1, "118", "3");
    bad.insert("revision".into(), json!(1.5));
    let err = store.merge(bad, Source::new("R2")).expect_err("should reject");
    assert!(matches!(err, MergeError::InvalidRevision { .. }));

    let mut missing = raw("1000", 1, "118", "3");
    missing.remove("revision");
    let err = store.merge(missing, Source::new("R2")).expect_err("should reject");
    assert_eq!(
        err,
        MergeError::MissingKey {
            device: Source::new("R2"),
            field: "revision",
        }
    );
}

#[test]
fn empty_queue_reports_no_change() {
    let (_tx, mut queue) = ingest_channel();
    let mut store = RecordStore::new();
    let outcome = queue.drain_into(&mut store);
    assert!(!outcome.changed());
    assert_eq!(outcome.dropped, 0);
}

#[test]
fn sync_summary_reports_highest_revision_per_timestamp() {
    let mut store = RecordStore::new();
    store.merge(raw("1000", 3, "118", "3"), Source::new("R1")).expect("merge");
    store.merge(raw("1000", 1, "118", "3"), Source::new("R1")).expect("merge");
    store.merge(raw("2000", 1, "118", "4"), Source::new("R1")).expect("merge");
    store.merge(raw("3000", 5, "118", "5"), Source::new("B1")).expect("merge");

    let summary = store.sync_summary("R1");
    assert_eq!(summary.len(), 2);
    assert_eq!(summary.get("1000"), Some(&3));
    assert_eq!(summary.get("2000"), Some(&1));
    assert!(store.sync_summary("nobody").is_empty());
}

#[test]
fn producers_on_many_threads_all_land() {
    let (tx, mut queue) = ingest_channel();
    let mut store = RecordStore::new();

    let threads: Vec<_> = (0..6)
        .map(|device| {
            let tx = tx.clone();
            std::thread::spawn(move || {
                for ts in 0..50u64 {
                    tx.enqueue(raw(&ts.to_string(), 1, "118", "1"), format!("D{device}"));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().expect("producer");
    }

    let outcome = queue.drain_into(&mut store);
    assert_eq!(outcome.merged, 300);
    assert_eq!(store.group_count(), 300);
}
