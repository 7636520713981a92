//! Distinguished-point hash table for collision detection.
//!
//! One row per x-coordinate fingerprint, holding the distance and type of
//! the first walk that reported it. The sharded map makes add-or-match
//! atomic per fingerprint, which is all cross-herd detection needs.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k256::Scalar;

use crate::walk::KangarooType;

#[derive(Clone, Copy)]
struct DpEntry {
    distance: Scalar,
    ktype: KangarooType,
}

/// Result of presenting a distinguished point to the table.
pub enum AddOutcome {
    /// No prior row for this fingerprint; the point was stored.
    Stored,
    /// A walk of the same type already reported this fingerprint: the two
    /// walks are merged and the reporter is useless from here on.
    SameHerd,
    /// A walk of the opposite type reported this fingerprint first — a
    /// tame/wild rendezvous candidate. Carries the stored row.
    CrossHerd {
        distance: Scalar,
        ktype: KangarooType,
    },
}

/// Central collision table, shared by every worker of one key search.
pub struct DpTable {
    entries: DashMap<u128, DpEntry>,
}

impl DpTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record a distinguished point, or report the collision it completes.
    /// The first row stored for a fingerprint wins; later reports only
    /// observe it.
    pub fn add(&self, fingerprint: u128, distance: Scalar, ktype: KangarooType) -> AddOutcome {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(entry) => {
                let stored = *entry.get();
                if stored.ktype == ktype {
                    AddOutcome::SameHerd
                } else {
                    AddOutcome::CrossHerd {
                        distance: stored.distance,
                        ktype: stored.ktype,
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(DpEntry { distance, ktype });
                AddOutcome::Stored
            }
        }
    }

    /// Drop every row. Called between target keys.
    pub fn reset(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (tame, wild) row counts, for progress diagnostics.
    pub fn count_by_type(&self) -> (usize, usize) {
        let mut tame = 0;
        let mut wild = 0;
        for entry in &self.entries {
            match entry.value().ktype {
                KangarooType::Tame => tame += 1,
                KangarooType::Wild => wild += 1,
            }
        }
        (tame, wild)
    }
}

impl Default for DpTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::reduce_u256;
    use k256::U256;

    fn scalar(v: u64) -> Scalar {
        reduce_u256(U256::from(v))
    }

    #[test]
    fn first_report_is_stored() {
        let table = DpTable::new();
        assert!(matches!(
            table.add(0xabcd, scalar(10), KangarooType::Tame),
            AddOutcome::Stored
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_type_report_matches_same_herd_and_keeps_first_row() {
        let table = DpTable::new();
        table.add(1, scalar(10), KangarooType::Tame);
        assert!(matches!(
            table.add(1, scalar(20), KangarooType::Tame),
            AddOutcome::SameHerd
        ));

        // The stored row must still be the first one: a wild report now
        // sees distance 10, not 20.
        match table.add(1, scalar(5), KangarooType::Wild) {
            AddOutcome::CrossHerd { distance, ktype } => {
                assert_eq!(distance, scalar(10));
                assert_eq!(ktype, KangarooType::Tame);
            }
            _ => panic!("expected a cross-herd match"),
        }
    }

    #[test]
    fn opposite_type_report_exposes_stored_row() {
        let table = DpTable::new();
        table.add(7, scalar(33), KangarooType::Wild);
        match table.add(7, scalar(44), KangarooType::Tame) {
            AddOutcome::CrossHerd { distance, ktype } => {
                assert_eq!(distance, scalar(33));
                assert_eq!(ktype, KangarooType::Wild);
            }
            _ => panic!("expected a cross-herd match"),
        }
    }

    #[test]
    fn distinct_fingerprints_do_not_collide() {
        let table = DpTable::new();
        table.add(1, scalar(1), KangarooType::Tame);
        assert!(matches!(
            table.add(2, scalar(2), KangarooType::Wild),
            AddOutcome::Stored
        ));
        assert_eq!(table.count_by_type(), (1, 1));
    }

    #[test]
    fn reset_drops_all_rows() {
        let table = DpTable::new();
        table.add(1, scalar(1), KangarooType::Tame);
        table.add(2, scalar(2), KangarooType::Wild);
        table.reset();
        assert!(table.is_empty());
        assert!(matches!(
            table.add(1, scalar(9), KangarooType::Wild),
            AddOutcome::Stored
        ));
    }
}
