//! Tests for destroyclaim-std: the file-hash index and the standard extensions end to end

use destroyclaim_engine::{DestroyClaim, Error, ModeSupport, ProcessMode, Support, SupportBuilder};
use destroyclaim_std::*;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn write(dir: &Path, name: &str, content: &str) -> String {
    std::fs::write(dir.join(name), content).unwrap();
    sha256_hex(content.as_bytes())
}

fn support(index: Arc<FileHashIndex>) -> Arc<Support> {
    let mut builder = SupportBuilder::new();
    builder
        .modes(ModeSupport::all())
        .add_supported_version("1.0.0")
        .add_supported_reasons(["security/integrity/malicious-data"]);
    register_std_extensions(&mut builder, index).unwrap();
    Arc::new(builder.build().unwrap())
}

fn claim(first: &str, second: &str, simulation: bool) -> Value {
    json!({
        "id": "02faafea-1c31-4771-b90b-2e8380af06dd",
        "isActive": true,
        "strictMode": false,
        "simulationMode": simulation,
        "modelVersion": "1.0.0",
        "destroyReasons": ["security/integrity/malicious-data"],
        "destroyContacts": [
            { "id": "contact", "name": "std:agent", "payload": { "name": "Jane Doe" }, "refs": ["02faafea-1c31-4771-b90b-2e8380af06dd"] }
        ],
        "destroySubjects": [
            { "id": "first", "name": "std:sha256", "payload": { "hash": first }, "action": "wipe" },
            { "id": "second", "name": "std:sha256", "payload": { "hash": second }, "conditions": { "var": "since" } }
        ],
        "destroyConditions": [
            { "id": "since", "name": "std:fromPointInTime", "payload": { "from": "2022-12-01T00:00:00.000Z" } }
        ],
        "destroyActions": [
            { "id": "wipe", "name": "std:destructionLevel", "payload": { "destructionLevel": "wiped" } }
        ]
    })
}

// ===========================================================================
// FileHashIndex
// ===========================================================================

#[tokio::test]
async fn index_finds_files_by_content_hash() {
    let dir = tempfile::tempdir().unwrap();
    let hash = write(dir.path(), "testFile1.txt", "Some content 1");
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    let nested = write(&dir.path().join("nested"), "testFile2.txt", "Some content 2");

    let index = FileHashIndex::build(dir.path(), "**/testFile*.txt").await.unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.exists(&hash).await);
    assert!(index.exists(&nested).await);
    assert_eq!(index.path_of(&hash).unwrap(), dir.path().join("testFile1.txt"));
}

#[tokio::test]
async fn destroy_unlinks_and_forgets() {
    let dir = tempfile::tempdir().unwrap();
    let hash = write(dir.path(), "a.txt", "alpha");
    let index = FileHashIndex::build(dir.path(), "**/*").await.unwrap();

    let path = index.destroy(&hash).await.unwrap();
    assert!(!path.exists());
    assert!(!index.exists(&hash).await);
    assert!(index.destroy(&hash).await.is_err());
}

#[tokio::test]
async fn wipe_unlinks_and_forgets() {
    let dir = tempfile::tempdir().unwrap();
    let hash = write(dir.path(), "a.txt", &"x".repeat(200_000));
    let index = FileHashIndex::build(dir.path(), "**/*").await.unwrap();

    let path = index.wipe(&hash).await.unwrap();
    assert!(!path.exists());
    assert!(index.is_empty());
}

#[tokio::test]
async fn simulated_destroy_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let hash = write(dir.path(), "a.txt", "alpha");
    let index = FileHashIndex::build(dir.path(), "**/*").await.unwrap();

    let path = index.simulate_destroy(&hash).await.unwrap();
    assert!(path.exists());
    assert!(index.exists(&hash).await);
    assert!(index.simulate_destroy(&sha256_hex(b"missing")).await.is_err());
}

#[tokio::test]
async fn refresh_picks_up_changes() {
    let dir = tempfile::tempdir().unwrap();
    let old = write(dir.path(), "a.txt", "old");
    let index = FileHashIndex::build(dir.path(), "**/*").await.unwrap();

    std::fs::remove_file(dir.path().join("a.txt")).unwrap();
    let new = write(dir.path(), "b.txt", "new");
    assert_eq!(index.refresh().await.unwrap(), 1);
    assert!(!index.exists(&old).await);
    assert!(index.exists(&new).await);
}

// ===========================================================================
// Standard extensions end to end
// ===========================================================================

#[tokio::test]
async fn real_mode_destroys_through_action_and_default() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "testFile1.txt", "Some content 1");
    let second = write(dir.path(), "testFile2.txt", "Some content 2");
    let untouched = write(dir.path(), "testFile3.txt", "Some content 3");
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/testFile*.txt").await.unwrap());

    let claim = DestroyClaim::new(claim(&first, &second, false), support(index.clone())).unwrap();
    let report = claim.process().await.unwrap();

    assert_eq!(report.mode, ProcessMode::Real);
    assert_eq!(report.processed.len(), 2);
    assert_eq!(report.processed[0].action_id.as_deref(), Some("wipe"));
    assert_eq!(report.processed[1].action_id, None);
    assert!(!dir.path().join("testFile1.txt").exists());
    assert!(!dir.path().join("testFile2.txt").exists());
    assert!(index.exists(&untouched).await);
}

#[tokio::test]
async fn simulation_mode_leaves_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "one.txt", "1");
    let second = write(dir.path(), "two.txt", "2");
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/*").await.unwrap());

    let claim = DestroyClaim::new(claim(&first, &second, true), support(index.clone())).unwrap();
    let report = claim.process().await.unwrap();

    assert_eq!(report.mode, ProcessMode::Simulation);
    assert_eq!(report.processed.len(), 2);
    assert_eq!(index.len(), 2);
    assert!(dir.path().join("one.txt").exists());
}

#[tokio::test]
async fn missing_file_fails_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "one.txt", "1");
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/*").await.unwrap());

    let claim = DestroyClaim::new(
        claim(&first, &sha256_hex(b"gone"), false),
        support(index.clone()),
    )
    .unwrap();
    let err = claim.process().await.unwrap_err();
    assert!(err.to_string().contains("not fulfilled"));
    assert!(dir.path().join("one.txt").exists());
}

#[tokio::test]
async fn future_point_in_time_fails_condition() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "one.txt", "1");
    let second = write(dir.path(), "two.txt", "2");
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/*").await.unwrap());

    let mut raw = claim(&first, &second, false);
    raw["destroyConditions"][0]["payload"]["from"] = json!("2999-01-01T00:00:00Z");
    let claim = DestroyClaim::new(raw, support(index)).unwrap();
    let state = claim.evaluate().await.unwrap();
    assert!(!state.passed("since"));
    assert!(!state.passed("second"));
    assert!(state.passed("first"));
}

#[tokio::test]
async fn time_interval_brackets_now() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "one.txt", "1");
    let second = write(dir.path(), "two.txt", "2");
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/*").await.unwrap());

    let mut raw = claim(&first, &second, false);
    raw["destroyConditions"] = json!([
        { "id": "since", "name": "std:inTimeInterval", "payload": { "from": "2000-01-01T00:00:00Z", "to": "2999-01-01T00:00:00Z" } }
    ]);
    let claim = DestroyClaim::new(raw, support(index)).unwrap();
    assert!(claim.evaluate().await.unwrap().passed("since"));
}

#[tokio::test]
async fn malformed_hash_is_rejected_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(FileHashIndex::build(dir.path(), "**/*").await.unwrap());
    let result = DestroyClaim::new(claim("not-a-hash", &sha256_hex(b"x"), false), support(index));
    assert!(matches!(result, Err(Error::SchemaValidation { .. })));
}
