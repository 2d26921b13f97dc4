//! Emptiness classification and tail comparison.

use super::Snapshot;

/// True when the snapshot carries no progress worth keeping: zero wallet
/// coins, zero bank coins and no inventory, bank item or bank ammo entries.
pub fn is_empty_like(snapshot: &Snapshot) -> bool {
    snapshot.coins == 0
        && snapshot.bank.coins == 0
        && snapshot.inventory.is_empty()
        && snapshot.bank.items.is_empty()
        && snapshot.bank.ammo.is_empty()
}

/// Same coins, inventory, bank and player; timestamps are ignored.
///
/// Reported to callers as `dedupLike`. It does not suppress the append.
pub fn same_progress(a: &Snapshot, b: &Snapshot) -> bool {
    a.coins == b.coins && a.inventory == b.inventory && a.bank == b.bank && a.player == b.player
}
