//! # Snapshot Module - Player State Data Model
//!
//! A [`Snapshot`] is one point-in-time capture of a player's wallet, inventory,
//! bank and position. Snapshots are kept per user in a [`UserDocument`], a
//! bounded FIFO ring ordered oldest first.
//!
//! ## Wire Shape
//!
//! ```json
//! {
//!   "version": 1,
//!   "timestamp": 1718000000000,
//!   "player": { "x": 12.5, "y": 40, "heartsSegs": 6 },
//!   "coins": 50,
//!   "inventory": { "sword": { "count": 1 } },
//!   "bank": { "coins": 0, "items": {}, "ammo": {} }
//! }
//! ```
//!
//! Item records inside `inventory`, `bank.items` and `bank.ammo` belong to the
//! game client and are stored as opaque JSON.
//!
//! ## Submodules
//!
//! - [`normalize`] - coerce arbitrary inbound JSON into a canonical [`Snapshot`]
//! - [`classify`] - empty-like predicate and tail comparison
//! - [`resolve`] - "latest valid" and "nth from end" lookups

pub mod classify;
pub mod normalize;
pub mod resolve;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use classify::{is_empty_like, same_progress};
pub use normalize::{normalize, now_millis};
pub use resolve::{latest_valid, nth_from_end};

/// Schema tag written into every normalized snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Schema tag written into every persisted user document.
pub const DOCUMENT_VERSION: u32 = 1;

/// Opaque client-owned mapping of item key to item record.
pub type ItemMap = Map<String, Value>;

/// Player position and health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    /// Remaining heart segments; `null` when the client did not report health.
    pub hearts_segs: Option<f64>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, hearts_segs: None }
    }
}

/// Banked coins and items, separate from the wallet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankState {
    pub coins: u64,
    pub items: ItemMap,
    pub ammo: ItemMap,
}

/// A normalized point-in-time capture of a player's state.
///
/// Deserialization goes through [`normalize`], so a `Snapshot` read from disk
/// or from the wire is always fully shaped even if the JSON was not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Snapshot {
    pub version: u32,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub player: PlayerState,
    pub coins: u64,
    pub inventory: ItemMap,
    pub bank: BankState,
}

impl Snapshot {
    /// The canonical empty snapshot returned when nothing meaningful is stored.
    pub fn empty_at(timestamp: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timestamp,
            player: PlayerState::default(),
            coins: 0,
            inventory: ItemMap::new(),
            bank: BankState::default(),
        }
    }

    /// Compact listing entry used by the diagnostics endpoint.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            timestamp: self.timestamp,
            empty_like: is_empty_like(self),
            coins: self.coins,
            bank_coins: self.bank.coins,
            inv_keys: self.inventory.len(),
        }
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        normalize(&value)
    }
}

/// Per-user persisted record: a capped, chronologically ordered ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDocument {
    #[serde(default = "default_document_version")]
    pub version: u32,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
}

fn default_document_version() -> u32 {
    DOCUMENT_VERSION
}

impl Default for UserDocument {
    fn default() -> Self {
        Self { version: DOCUMENT_VERSION, snapshots: Vec::new() }
    }
}

impl UserDocument {
    /// Most recently appended entry, regardless of emptiness.
    pub fn tail(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Append at the tail, then evict from the head until `len <= cap`.
    /// Returns the number of evicted entries.
    pub fn push_capped(&mut self, snapshot: Snapshot, cap: usize) -> usize {
        self.snapshots.push(snapshot);
        let overflow = self.snapshots.len().saturating_sub(cap);
        if overflow > 0 {
            self.snapshots.drain(..overflow);
        }
        overflow
    }

    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.snapshots.iter().map(Snapshot::summary).collect()
    }
}

/// One line of the diagnostic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub timestamp: i64,
    pub empty_like: bool,
    pub coins: u64,
    pub bank_coins: u64,
    pub inv_keys: usize,
}
