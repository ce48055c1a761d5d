use std::fs;

use serde_json::json;
use tempfile::TempDir;

use scoutlog::{
    config::FieldSchema,
    core::store::RecordStore,
    persist::{PersistError, csv::{CsvExporter, MISSING_MARKER}, json::SnapshotFile},
    record::RawRecord,
    types::Source,
};

fn raw(ts: u64, rev: u64, team: &str, match_id: &str, comments: &str) -> RawRecord {
    json!({
        "timestamp": ts,
        "revision": rev,
        "team": team,
        "match": match_id,
        "alliance": "blue",
        "noShow": false,
        "comments": comments,
        "recorderName": "Grace",
        "autoLine": true,
        "climb": 2,
    })
    .as_object()
    .cloned()
    .expect("object")
}

fn schema() -> FieldSchema {
    FieldSchema::parse_header("AUTO_LINE,CLIMB")
}

fn seeded_store() -> RecordStore {
    let mut store = RecordStore::new();
    store.merge(raw(1000, 1, "118", "3", "slow"), Source::new("R1")).expect("merge");
    store.merge(raw(1000, 2, "119", "3", "fast"), Source::new("R1")).expect("merge");
    store.merge(raw(2000, 1, "254", "3", "said \"wow\", twice"), Source::new("B2")).expect("merge");
    store
}

#[test]
fn snapshot_round_trips_every_revision() {
    let tmp = TempDir::new().expect("tmp");
    let file = SnapshotFile::new(tmp.path().join("data.json"));
    let store = seeded_store();

    file.write(&store).expect("write");
    let loaded = file.load().expect("load");

    assert_eq!(loaded.export_snapshot(), store.export_snapshot());
    assert_eq!(loaded.record_count(), 3);
    assert_eq!(loaded.group("R1", "1000").map(|g| g.len()), Some(2));
}

#[test]
fn snapshot_uses_nested_string_keys() {
    let tmp = TempDir::new().expect("tmp");
    let file = SnapshotFile::new(tmp.path().join("data.json"));
    file.write(&seeded_store()).expect("write");

    let doc: serde_json::Value =
        serde_json::from_slice(&fs::read(file.path()).expect("read")).expect("json");
    assert_eq!(doc["R1"]["1000"]["2"]["team"], json!("119"));
    assert_eq!(doc["R1"]["1000"]["1"]["team"], json!("118"));
    assert_eq!(doc["B2"]["2000"]["1"]["climb"], json!(2));
    assert!(!tmp.path().join("data.json.tmp").exists());
}

#[test]
fn missing_snapshot_is_fatal() {
    let tmp = TempDir::new().expect("tmp");
    let err = SnapshotFile::new(tmp.path().join("data.json")).load().expect_err("must fail");
    assert!(matches!(err, PersistError::SnapshotMissing { .. }));
}

#[test]
fn corrupt_snapshot_is_fatal() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("data.json");
    fs::write(&path, b"{\"R1\": {\"1000\": ").expect("write");
    let err = SnapshotFile::new(&path).load().expect_err("must fail");
    assert!(matches!(err, PersistError::Corrupt { .. }));
}

#[test]
fn non_numeric_revision_key_is_fatal() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("data.json");
    fs::write(&path, br#"{"R1": {"1000": {"one": {"team": "118"}}}}"#).expect("write");
    let err = SnapshotFile::new(&path).load().expect_err("must fail");
    assert!(matches!(err, PersistError::Inconsistent { .. }));
}

#[test]
fn init_empty_only_creates_once() {
    let tmp = TempDir::new().expect("tmp");
    let file = SnapshotFile::new(tmp.path().join("nested").join("data.json"));
    assert!(file.init_empty().expect("init"));
    assert!(!file.init_empty().expect("init again"));
    assert!(file.load().expect("load").is_empty());
}

#[test]
fn export_has_one_row_per_group_with_latest_revision() {
    let tmp = TempDir::new().expect("tmp");
    let exporter = CsvExporter::new(tmp.path().join("data.csv"), schema().export_columns());
    let summary = exporter.write(&seeded_store()).expect("export");
    assert_eq!(summary.rows, 2);
    assert!(summary.missing.is_empty());

    let text = fs::read_to_string(exporter.path()).expect("read");
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("team,match,alliance,noShow,comments,revision,timestamp,recorderName,autoLine,climb")
    );
    assert_eq!(lines.next(), Some("254,3,blue,false,\"said \"\"wow\"\", twice\",1,2000,\"Grace\",true,2"));
    assert_eq!(lines.next(), Some("119,3,blue,false,\"fast\",2,1000,\"Grace\",true,2"));
    assert_eq!(lines.next(), None);

    let mut reader = csv::Reader::from_path(exporter.path()).expect("csv");
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().expect("parse");
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][4], "said \"wow\", twice");
    assert_eq!(&rows[1][0], "119");
}

#[test]
fn export_is_stable_without_new_data() {
    let tmp = TempDir::new().expect("tmp");
    let exporter = CsvExporter::new(tmp.path().join("data.csv"), schema().export_columns());
    let store = seeded_store();

    exporter.write(&store).expect("first");
    let first = fs::read(exporter.path()).expect("read");
    exporter.write(&store).expect("second");
    let second = fs::read(exporter.path()).expect("read");
    assert_eq!(first, second);
}

#[test]
fn empty_store_still_writes_header() {
    let tmp = TempDir::new().expect("tmp");
    let exporter = CsvExporter::new(tmp.path().join("data.csv"), schema().export_columns());
    let summary = exporter.write(&RecordStore::new()).expect("export");
    assert_eq!(summary.rows, 0);
    let text = fs::read_to_string(exporter.path()).expect("read");
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("team,match,"));
}

#[test]
fn missing_field_renders_marker_and_export_continues() {
    let tmp = TempDir::new().expect("tmp");
    let exporter = CsvExporter::new(tmp.path().join("data.csv"), schema().export_columns());
    let mut store = seeded_store();
    let mut partial = raw(3000, 4, "1678", "4", "ok");
    partial.remove("climb");
    store.merge(partial, Source::new("R3")).expect("merge");

    let summary = exporter.write(&store).expect("export");
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.missing.len(), 1);
    assert_eq!(summary.missing[0].field, "climb");
    assert_eq!(summary.missing[0].timestamp, "3000");
    assert_eq!(summary.missing[0].revision, 4);

    let text = fs::read_to_string(exporter.path()).expect("read");
    let r3 = text.lines().find(|l| l.starts_with("1678,")).expect("row");
    assert!(r3.ends_with(&format!(",{MISSING_MARKER}")));
}

#[test]
fn array_and_comma_cells_stay_in_their_column() {
    let tmp = TempDir::new().expect("tmp");
    let exporter = CsvExporter::new(
        tmp.path().join("data.csv"),
        FieldSchema::parse_header("CYCLES,START_POS").export_columns(),
    );
    let mut record = raw(1000, 1, "118", "3", "c");
    record.insert("cycles".into(), json!([1, 2, 3]));
    record.insert("startPos".into(), json!("left, near wall"));
    let mut store = RecordStore::new();
    store.merge(record, Source::new("R1")).expect("merge");

    exporter.write(&store).expect("export");

    let mut reader = csv::Reader::from_path(exporter.path()).expect("csv");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(headers.len(), 10);
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().expect("parse");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), headers.len());
    assert_eq!(&rows[0][8], "[1,2,3]");
    assert_eq!(&rows[0][9], "left, near wall");
}
