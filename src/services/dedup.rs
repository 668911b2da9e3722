use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::types::models::{RawRecord, Snapshot};

/// Collapses records to the most recent one per subject.
///
/// Pure and order-independent: [`RawRecord::recency_cmp`] is a total order,
/// so the same multiset of records always yields the same snapshot.
pub fn deduplicate<I>(records: I) -> Snapshot
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut latest: BTreeMap<_, RawRecord> = BTreeMap::new();
    for record in records {
        match latest.entry(record.subject.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.recency_cmp(slot.get()) == Ordering::Greater {
                    slot.insert(record);
                }
            }
        }
    }
    Snapshot::from_map(latest)
}
