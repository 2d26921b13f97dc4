//! # HTTP Access Layer
//!
//! Framework-independent request handling for the three state endpoints. The
//! axum binding in [`server`] only extracts path, query and body and hands them
//! to the functions here.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /state/{user}` | [`get_state`] |
//! | `GET /state/{user}/snapshots` | [`list_snapshots`] |
//! | `POST /state/{user}` | [`post_state`] |
//!
//! Inbound bodies stay untyped ([`serde_json::Value`]) until the store
//! normalizes them; nothing past [`decode_body`] sees an unvalidated shape.

pub mod server;

use std::collections::HashMap;

use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::StoreResult;
use crate::logutil::{escape_log, preview};
use crate::snapshot::{
    is_empty_like, latest_valid, now_millis, nth_from_end, Snapshot, SnapshotSummary, UserDocument,
};
use crate::storage::{AppendOutcome, SnapshotStore};

/// Parsed query string of `GET /state/{user}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateQuery {
    /// Position counted back from the latest entry.
    pub offset: usize,
    /// Return the whole document instead of one resolved snapshot.
    pub raw: bool,
    /// With `offset > 0`, count empty-like entries too.
    pub allow_empty: bool,
}

impl StateQuery {
    /// Lenient parse: bad offsets read as `0`, unknown keys are ignored.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let flag = |key: &str| params.get(key).is_some_and(|v| is_truthy(v));
        Self {
            offset: params
                .get("offset")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0),
            raw: flag("raw"),
            allow_empty: flag("allowEmpty"),
        }
    }
}

/// `?flag`, `?flag=1`, `?flag=true`, `?flag=yes` and `?flag=on` are set.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}

/// Decode a POST body into an untyped snapshot candidate.
///
/// Accepts a JSON object, or a JSON string whose contents are a JSON object
/// (page-hide beacons often deliver text). Anything unparseable becomes `{}`.
pub fn decode_body(body: &[u8]) -> Value {
    let empty = || Value::Object(Map::new());
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::String(inner)) => serde_json::from_str(&inner).unwrap_or_else(|_| empty()),
        Ok(value) => value,
        Err(_) => empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateResponse {
    pub ok: bool,
    pub empty: bool,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDocumentResponse {
    pub ok: bool,
    pub raw: bool,
    pub document: UserDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GetStateResponse {
    Resolved(StateResponse),
    Raw(RawDocumentResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotListResponse {
    pub ok: bool,
    pub total: usize,
    pub snapshots: Vec<SnapshotSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: AppendOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

/// Resolve the snapshot a `GET /state/{user}` asks for.
///
/// Offset `0` is always the latest non-empty-like entry; `allowEmpty` only
/// widens lookups further back. When nothing matches, a canonical empty
/// snapshot stamped with the current time is returned.
pub async fn get_state(store: &SnapshotStore, user: &str, query: StateQuery) -> GetStateResponse {
    let document = store.load(user).await;

    if query.raw {
        return GetStateResponse::Raw(RawDocumentResponse {
            ok: true,
            raw: true,
            document: document.unwrap_or_default(),
        });
    }

    let found = if query.offset == 0 {
        latest_valid(document.as_ref())
    } else {
        nth_from_end(document.as_ref(), query.offset, !query.allow_empty)
    };
    let snapshot = found.cloned().unwrap_or_else(|| Snapshot::empty_at(now_millis()));
    debug!(
        "GET state {} offset={} -> {}",
        escape_log(user),
        query.offset,
        if found.is_some() { "hit" } else { "empty default" }
    );

    GetStateResponse::Resolved(StateResponse {
        ok: true,
        empty: is_empty_like(&snapshot),
        snapshot,
    })
}

/// Diagnostic listing, one summary per stored entry.
pub async fn list_snapshots(store: &SnapshotStore, user: &str) -> SnapshotListResponse {
    let snapshots = store.summaries(user).await;
    SnapshotListResponse { ok: true, total: snapshots.len(), snapshots }
}

/// Append a snapshot candidate from a raw request body.
pub async fn post_state(store: &SnapshotStore, user: &str, body: &[u8]) -> StoreResult<SaveResponse> {
    debug!(
        "POST state {} ({} bytes): {}",
        escape_log(user),
        body.len(),
        preview(&String::from_utf8_lossy(body), 200)
    );
    let candidate = decode_body(body);
    let outcome = store.append(user, &candidate).await?;
    Ok(SaveResponse { ok: true, outcome })
}
