//! Test utilities & fixtures shared by the integration tests.

use serde_json::{json, Value};
use statekeep::config::StorageConfig;
use statekeep::storage::SnapshotStore;

/// A store rooted in a fresh temp dir. Keep the `TempDir` alive for the test.
#[allow(dead_code)]
pub async fn temp_store(max_snapshots: usize) -> (tempfile::TempDir, SnapshotStore) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = StorageConfig::at(tmp.path().join("state")).with_max_snapshots(max_snapshots);
    let store = SnapshotStore::new(config).await.expect("store new");
    (tmp, store)
}

/// A meaningful save candidate with a fixed timestamp.
#[allow(dead_code)]
pub fn save(coins: u64, timestamp: i64) -> Value {
    json!({
        "timestamp": timestamp,
        "player": { "x": 10, "y": 20, "heartsSegs": 6 },
        "coins": coins,
        "inventory": {},
        "bank": { "coins": 0, "items": {}, "ammo": {} }
    })
}

/// The all-zero save a freshly loaded page sends before hydration.
#[allow(dead_code)]
pub fn blank_save() -> Value {
    json!({ "coins": 0, "inventory": {}, "bank": { "coins": 0, "items": {}, "ammo": {} } })
}
