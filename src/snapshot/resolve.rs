//! Retrieval over a user's snapshot ring.
//!
//! Both lookups walk from the tail (most recent) towards the head. With
//! `require_valid` set, empty-like entries are skipped and do not count
//! towards the offset. Entries are re-classified on every read since stored
//! documents may predate the current write policy or be edited by hand.

use super::{is_empty_like, Snapshot, UserDocument};

/// Most recent snapshot that is not empty-like.
pub fn latest_valid(document: Option<&UserDocument>) -> Option<&Snapshot> {
    nth_from_end(document, 0, true)
}

/// The `n`th snapshot counting back from the tail (`0` = latest).
pub fn nth_from_end(
    document: Option<&UserDocument>,
    n: usize,
    require_valid: bool,
) -> Option<&Snapshot> {
    document?
        .snapshots
        .iter()
        .rev()
        .filter(|s| !require_valid || !is_empty_like(s))
        .nth(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(coins: &[u64]) -> UserDocument {
        let mut doc = UserDocument::default();
        for (i, c) in coins.iter().enumerate() {
            let mut s = Snapshot::empty_at(i as i64);
            s.coins = *c;
            doc.snapshots.push(s);
        }
        doc
    }

    #[test]
    fn absent_or_empty_documents_resolve_to_none() {
        assert!(latest_valid(None).is_none());
        assert!(latest_valid(Some(&doc(&[]))).is_none());
        assert!(latest_valid(Some(&doc(&[0, 0, 0]))).is_none());
    }

    #[test]
    fn latest_valid_skips_trailing_empty_entries() {
        let d = doc(&[10, 20, 0, 0]);
        assert_eq!(latest_valid(Some(&d)).map(|s| s.coins), Some(20));
    }

    #[test]
    fn offset_counts_only_meaningful_entries_when_filtered() {
        let d = doc(&[10, 0, 20, 0, 30]);
        let coins = |n| nth_from_end(Some(&d), n, true).map(|s| s.coins);
        assert_eq!(coins(0), Some(30));
        assert_eq!(coins(1), Some(20));
        assert_eq!(coins(2), Some(10));
        assert_eq!(coins(3), None);
    }

    #[test]
    fn raw_walk_counts_every_entry() {
        let d = doc(&[10, 0, 20, 0, 30]);
        let stamp = |n| nth_from_end(Some(&d), n, false).map(|s| s.timestamp);
        assert_eq!(stamp(0), Some(4));
        assert_eq!(stamp(1), Some(3));
        assert_eq!(stamp(4), Some(0));
        assert_eq!(stamp(5), None);
    }
}
