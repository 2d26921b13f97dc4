//! Coerce arbitrary inbound JSON into a canonical [`Snapshot`].
//!
//! Normalization never fails: wrong types and missing fields are replaced by
//! defaults (`0`, `{}`, `null` for `heartsSegs`). Unknown top-level fields
//! are dropped. Running it twice yields the same snapshot.

use chrono::Utc;
use serde_json::Value;

use super::{BankState, ItemMap, PlayerState, Snapshot, SNAPSHOT_VERSION};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Normalize `input` using the current time as the default timestamp.
pub fn normalize(input: &Value) -> Snapshot {
    normalize_at(input, now_millis())
}

/// Normalize `input`, substituting `now` when no numeric timestamp is present.
pub fn normalize_at(input: &Value, now: i64) -> Snapshot {
    let field = |name: &str| input.get(name);

    let bank = field("bank");
    Snapshot {
        version: SNAPSHOT_VERSION,
        timestamp: timestamp(field("timestamp")).unwrap_or(now),
        player: player(field("player")),
        coins: non_negative_int(field("coins")),
        inventory: item_map(field("inventory")),
        bank: BankState {
            coins: non_negative_int(bank.and_then(|b| b.get("coins"))),
            items: item_map(bank.and_then(|b| b.get("items"))),
            ammo: item_map(bank.and_then(|b| b.get("ammo"))),
        },
    }
}

fn player(value: Option<&Value>) -> PlayerState {
    let get = |name: &str| value.and_then(|p| p.get(name));
    PlayerState {
        x: finite_number(get("x")).unwrap_or(0.0),
        y: finite_number(get("y")).unwrap_or(0.0),
        hearts_segs: finite_number(get("heartsSegs")),
    }
}

fn timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        _ => None,
    }
}

/// Numbers and numeric strings; anything else (including NaN/inf) is `None`.
fn finite_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Floors fractional amounts and clamps negatives to zero.
fn non_negative_int(value: Option<&Value>) -> u64 {
    if let Some(Value::Number(n)) = value {
        if let Some(u) = n.as_u64() {
            return u;
        }
    }
    match finite_number(value) {
        Some(f) if f > 0.0 => f.floor() as u64,
        _ => 0,
    }
}

fn item_map(value: Option<&Value>) -> ItemMap {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => ItemMap::new(),
    }
}
