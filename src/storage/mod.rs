//! # Storage Module - Snapshot Persistence Layer
//!
//! [`SnapshotStore`] owns one JSON document per user and keeps it as a capped,
//! oldest-first ring of [`Snapshot`]s.
//!
//! ## Layout
//!
//! ```text
//! data/state/
//! ├── alice.json      ← {"version": 1, "snapshots": [...]}
//! ├── player-7.json
//! └── ...
//! ```
//!
//! File stems come from [`safe_user_file`]: lower-cased, with everything
//! outside `[a-z0-9-_]` replaced by `-`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use statekeep::config::StorageConfig;
//! use statekeep::storage::SnapshotStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SnapshotStore::new(StorageConfig::at("./data/state")).await?;
//!
//!     let outcome = store.append("alice", &serde_json::json!({ "coins": 50 })).await?;
//!     assert!(outcome.stored);
//!
//!     let latest = store.latest("alice").await;
//!     assert_eq!(latest.map(|s| s.coins), Some(50));
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Semantics
//!
//! - **Reads**: a missing, oversized or unparseable document is "no document".
//!   [`SnapshotStore::load`] never errors.
//! - **Writes**: every persist rewrites the whole document through a locked
//!   temp-file-and-rename. Any I/O failure is returned as [`StoreError`].
//! - **Size limits**: snapshots over `max_snapshot_bytes` are rejected, and a
//!   document over [`SnapshotStore::document_limit`] is neither written nor
//!   replaced by [`SnapshotStore::append`]. Only unparseable content starts a
//!   fresh ring.
//! - **Empty-like saves** are not errors; they are acknowledged with
//!   `stored = false` and leave the document untouched.
//!
//! ## Concurrency
//!
//! [`SnapshotStore::append`] holds a per-user async lock across
//! load-modify-persist, so concurrent appends for one user are applied one
//! after another. The lock is handed to the blocking writer, so it stays held
//! until the file is replaced even if the caller goes away mid-write.
//! [`SnapshotStore::load`] and [`SnapshotStore::save`] are the unlocked
//! primitives; a caller combining them itself gets last-writer-wins.

pub mod locks;

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;

use crate::config::StorageConfig;
use crate::errors::{StoreError, StoreResult};
use crate::logutil::escape_log;
use crate::snapshot::{
    is_empty_like, latest_valid, normalize, nth_from_end, same_progress, Snapshot,
    SnapshotSummary, UserDocument,
};
use crate::validation::{safe_user_file, secure_json_parse, user_document_path, validate_file_size};
use fs2::FileExt;
use locks::{UserLocks, UserWriteGuard};

/// `reason` reported when an empty-like save is acknowledged without storing.
pub const REASON_EMPTY_LIKE: &str = "empty-like-ignored";

/// Result of [`SnapshotStore::append`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendOutcome {
    pub stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// The normalized snapshot, echoed whether or not it was stored.
    pub snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Whether the stored snapshot matched the previous tail apart from its
    /// timestamp. Informational only; the entry is appended either way.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_like: Option<bool>,
}

/// Main storage interface
pub struct SnapshotStore {
    config: StorageConfig,
    capacity: usize,
    document_limit: u64,
    locks: Arc<UserLocks>,
}

/// What reading a user's document found.
enum DocumentRead {
    Missing,
    /// Present but not a parseable document.
    Corrupt,
    /// Present but larger than the document limit; left untouched.
    TooLarge(u64),
    Loaded(UserDocument),
}

impl SnapshotStore {
    /// Initialize storage rooted at `config.data_dir`, creating it if needed.
    pub async fn new(config: StorageConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.data_dir).await?;
        let capacity = config.capacity();
        let document_limit = config.document_limit();
        info!(
            "Snapshot store at {} (ring capacity {}, snapshot limit {} bytes, document limit {} bytes)",
            config.data_dir.display(),
            capacity,
            config.max_snapshot_bytes,
            document_limit
        );
        Ok(Self { config, capacity, document_limit, locks: Arc::new(UserLocks::new()) })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Maximum number of snapshots retained per user.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size limit applied to documents on read and write.
    pub fn document_limit(&self) -> u64 {
        self.document_limit
    }

    pub fn document_path(&self, user: &str) -> PathBuf {
        user_document_path(&self.config.data_dir, user)
    }

    /// Read a user's document. Absent, oversized and corrupt files all yield `None`.
    pub async fn load(&self, user: &str) -> Option<UserDocument> {
        match self.read_document(user).await {
            Ok(DocumentRead::Loaded(doc)) => Some(doc),
            Ok(_) => None,
            Err(e) => {
                warn!("Cannot read {}: {}", self.document_path(user).display(), e);
                None
            }
        }
    }

    async fn read_document(&self, user: &str) -> std::io::Result<DocumentRead> {
        let path = self.document_path(user);

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No document for {}", escape_log(user));
                return Ok(DocumentRead::Missing);
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = validate_file_size(metadata.len(), self.document_limit) {
            warn!("Ignoring document {}: {}", path.display(), e);
            return Ok(DocumentRead::TooLarge(metadata.len()));
        }

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!("Treating {} as absent: {}", path.display(), e);
                return Ok(DocumentRead::Corrupt);
            }
            Err(e) => return Err(e),
        };
        match secure_json_parse::<UserDocument>(&content, self.document_limit) {
            Ok(doc) => {
                debug!("Loaded {} snapshot(s) for {}", doc.snapshots.len(), escape_log(user));
                Ok(DocumentRead::Loaded(doc))
            }
            Err(e) => {
                warn!("Treating {} as absent: {}", path.display(), e);
                Ok(DocumentRead::Corrupt)
            }
        }
    }

    /// Overwrite a user's document in full. No per-user lock is taken.
    pub async fn save(&self, user: &str, document: &UserDocument) -> StoreResult<()> {
        self.persist(user, document, None).await
    }

    /// Serialize and write `document`. A held guard moves into the blocking
    /// writer and is released only once the write has finished, even if the
    /// awaiting future is dropped first.
    async fn persist(
        &self,
        user: &str,
        document: &UserDocument,
        guard: Option<UserWriteGuard>,
    ) -> StoreResult<()> {
        let path = self.document_path(user);
        let content = serde_json::to_string_pretty(document)?;
        let size = content.len() as u64;
        if size > self.document_limit {
            return Err(StoreError::DocumentTooLarge { size, limit: self.document_limit });
        }
        tokio::task::spawn_blocking(move || {
            let written = write_file_locked(&path, &content);
            drop(guard);
            written
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Normalize `raw` and, unless it is empty-like, append it to the user's
    /// ring, evicting the oldest entries beyond capacity, then persist.
    ///
    /// An existing document that is unreadable for any reason other than bad
    /// content (I/O failure, over the size limit) is never replaced; the
    /// append fails instead.
    pub async fn append(&self, user: &str, raw: &Value) -> StoreResult<AppendOutcome> {
        let snapshot = normalize(raw);

        if is_empty_like(&snapshot) {
            debug!("Ignoring empty-like save for {}", escape_log(user));
            return Ok(AppendOutcome {
                stored: false,
                reason: Some(REASON_EMPTY_LIKE),
                snapshot,
                total: None,
                dedup_like: None,
            });
        }

        let size = serde_json::to_vec(&snapshot)?.len() as u64;
        if size > self.config.max_snapshot_bytes {
            warn!("Rejecting {} byte snapshot for {}", size, escape_log(user));
            return Err(StoreError::SnapshotTooLarge { size, limit: self.config.max_snapshot_bytes });
        }

        let guard = self.locks.acquire(&safe_user_file(user)).await;

        let mut document = match self.read_document(user).await {
            Ok(DocumentRead::Loaded(doc)) => doc,
            Ok(DocumentRead::Missing) | Ok(DocumentRead::Corrupt) => UserDocument::default(),
            Ok(DocumentRead::TooLarge(size)) => {
                error!("Refusing to replace oversized document for {}", escape_log(user));
                return Err(StoreError::DocumentTooLarge { size, limit: self.document_limit });
            }
            Err(e) => {
                error!("Cannot read document for {}: {}", escape_log(user), e);
                return Err(e.into());
            }
        };
        let dedup_like = document.tail().is_some_and(|prev| same_progress(prev, &snapshot));
        let evicted = document.push_capped(snapshot.clone(), self.capacity);
        let total = document.snapshots.len();

        if let Err(e) = self.persist(user, &document, Some(guard)).await {
            error!("Failed to persist snapshots for {}: {}", escape_log(user), e);
            return Err(e);
        }

        info!(
            "Stored snapshot for {} (total {}, evicted {}, dedupLike {})",
            escape_log(user),
            total,
            evicted,
            dedup_like
        );
        Ok(AppendOutcome {
            stored: true,
            reason: None,
            snapshot,
            total: Some(total),
            dedup_like: Some(dedup_like),
        })
    }

    /// Most recent non-empty-like snapshot for `user`.
    pub async fn latest(&self, user: &str) -> Option<Snapshot> {
        let document = self.load(user).await;
        latest_valid(document.as_ref()).cloned()
    }

    /// The `n`th snapshot back from the tail, optionally skipping empty-like entries.
    pub async fn nth(&self, user: &str, n: usize, require_valid: bool) -> Option<Snapshot> {
        let document = self.load(user).await;
        nth_from_end(document.as_ref(), n, require_valid).cloned()
    }

    /// Compact per-entry listing for diagnostics, oldest first.
    pub async fn summaries(&self, user: &str) -> Vec<SnapshotSummary> {
        self.load(user).await.map(|d| d.summaries()).unwrap_or_default()
    }
}

/// Write `content` to `path` atomically under an exclusive file lock.
///
/// Blocking; call from `spawn_blocking`.
fn write_file_locked(path: &Path, content: &str) -> StoreResult<()> {
    replace_file_locked(path, |tmp| {
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.sync_all()
    })
}

/// Replace `path` with a temp file populated by `fill`.
///
/// If `path` did not exist and the replacement fails, the empty lock target
/// opened here is removed again.
fn replace_file_locked(
    path: &Path,
    fill: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> StoreResult<()> {
    use std::fs::{self, OpenOptions};

    // Step 1: Open (or create) the destination file to acquire an exclusive lock
    let existed = path.exists();
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)?;

    let replaced = lock_file
        .lock_exclusive()
        .map_err(StoreError::from)
        .and_then(|()| swap_in(path, fill));
    if replaced.is_err() && !existed {
        let _ = fs::remove_file(path);
    }

    drop(lock_file);
    replaced
}

fn swap_in(
    path: &Path,
    fill: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> StoreResult<()> {
    use std::fs::{self, File, OpenOptions};

    // Step 2: Write a uniquely named temp file in the same directory and fsync
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("document.json");
    let tmp_path = dir.join(format!(".{}.tmp-{}", base, uuid::Uuid::new_v4()));
    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .and_then(|mut tmp| fill(&mut tmp));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    // Step 3: Atomically replace the destination with the temp file
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    // Step 4: Fsync the directory to persist the rename (best-effort)
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store(dir: &Path, cap: usize) -> SnapshotStore {
        SnapshotStore::new(StorageConfig::at(dir).with_max_snapshots(cap)).await.unwrap()
    }

    #[tokio::test]
    async fn append_creates_document_on_first_meaningful_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path(), 10).await;
        assert!(store.load("alice").await.is_none());

        let out = store.append("alice", &json!({ "coins": 5 })).await.unwrap();
        assert!(out.stored);
        assert_eq!(out.total, Some(1));
        assert_eq!(out.dedup_like, Some(false));
        assert!(store.document_path("alice").exists());
    }

    #[tokio::test]
    async fn empty_like_append_does_not_create_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path(), 10).await;
        let out = store.append("ghost", &json!({})).await.unwrap();
        assert!(!out.stored);
        assert_eq!(out.reason, Some(REASON_EMPTY_LIKE));
        assert!(!store.document_path("ghost").exists());
    }

    #[tokio::test]
    async fn documents_are_written_pretty_printed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path(), 10).await;
        store.append("alice", &json!({ "coins": 1 })).await.unwrap();
        let text = std::fs::read_to_string(store.document_path("alice")).unwrap();
        assert!(text.starts_with("{\n"));
        assert!(text.contains("\"snapshots\": ["));
    }

    #[tokio::test]
    async fn no_temp_files_are_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path(), 2).await;
        for c in 1..=4 {
            store.append("alice", &json!({ "coins": c })).await.unwrap();
        }
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alice.json".to_string()]);
    }

    fn disk_full(_: &mut std::fs::File) -> std::io::Result<()> {
        Err(std::io::Error::new(ErrorKind::Other, "no space left on device"))
    }

    #[test]
    fn failed_first_write_leaves_no_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("alice.json");

        assert!(replace_file_locked(&path, disk_full).is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_rewrite_keeps_the_previous_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("alice.json");
        std::fs::write(&path, "{\"version\": 1, \"snapshots\": []}").unwrap();

        assert!(replace_file_locked(&path, disk_full).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"version\": 1, \"snapshots\": []}"
        );
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn oversized_snapshot_is_rejected_without_touching_the_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::at(tmp.path());
        config.max_snapshot_bytes = 256;
        let store = SnapshotStore::new(config).await.unwrap();
        store.append("alice", &json!({ "coins": 1 })).await.unwrap();
        let before = std::fs::read(store.document_path("alice")).unwrap();

        let big = json!({ "coins": 2, "inventory": { "note": "x".repeat(1024) } });
        let err = store.append("alice", &big).await.unwrap_err();
        assert!(matches!(err, StoreError::SnapshotTooLarge { limit: 256, .. }), "got {:?}", err);
        assert_eq!(std::fs::read(store.document_path("alice")).unwrap(), before);
    }

    #[tokio::test]
    async fn save_refuses_documents_over_the_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::at(tmp.path()).with_max_snapshots(1);
        config.max_snapshot_bytes = 16;
        config.max_document_bytes = 0;
        let store = SnapshotStore::new(config).await.unwrap();

        let mut doc = UserDocument::default();
        let snapshot = normalize(&json!({ "coins": 1, "inventory": { "note": "x".repeat(200 * 1024) } }));
        doc.push_capped(snapshot, 1);
        let err = store.save("alice", &doc).await.unwrap_err();
        assert!(matches!(err, StoreError::DocumentTooLarge { .. }), "got {:?}", err);
        assert!(!store.document_path("alice").exists());
    }

    #[tokio::test]
    async fn user_ids_differing_only_in_case_share_a_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path(), 10).await;
        store.append("Alice", &json!({ "coins": 1 })).await.unwrap();
        let out = store.append("alice", &json!({ "coins": 2 })).await.unwrap();
        assert_eq!(out.total, Some(2));
    }
}
