//! Transaction-time index: id to instant and instant to ids

use crate::core::fact::{TxId, TxMetadata};
use crate::core::temporal::Timestamp;
use std::collections::BTreeMap;

/// Transaction-time index for time-based view selection
#[derive(Debug, Clone, Default)]
pub struct TxTimeIndex {
    /// Map from timestamp to transactions committed at that instant
    by_time: BTreeMap<Timestamp, Vec<TxId>>,
    /// Map from transaction to its timestamp
    by_id: BTreeMap<TxId, Timestamp>,
}

impl TxTimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metadata: TxMetadata) {
        self.by_time
            .entry(metadata.timestamp)
            .or_default()
            .push(metadata.id);
        self.by_id.insert(metadata.id, metadata.timestamp);
    }

    pub fn contains(&self, id: TxId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn timestamp(&self, id: TxId) -> Option<Timestamp> {
        self.by_id.get(&id).copied()
    }

    pub fn latest(&self) -> Option<TxMetadata> {
        self.by_id
            .last_key_value()
            .map(|(id, timestamp)| TxMetadata {
                id: *id,
                timestamp: *timestamp,
            })
    }

    /// Latest transaction committed at or before `timestamp`
    pub fn latest_at(&self, timestamp: Timestamp) -> Option<TxId> {
        self.by_time
            .range(..=timestamp)
            .next_back()
            .and_then(|(_, ids)| ids.last().copied())
    }

    /// Transactions committed in `[start, end)`
    pub fn find_in_range(&self, start: Timestamp, end: Timestamp) -> Vec<TxId> {
        self.by_time
            .range(start..end)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Metadata of every transaction up to and including `bound`
    pub fn up_to(&self, bound: TxId) -> Vec<TxMetadata> {
        self.by_id
            .range(..=bound)
            .map(|(id, timestamp)| TxMetadata {
                id: *id,
                timestamp: *timestamp,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: u64, secs: i64) -> TxMetadata {
        TxMetadata {
            id: TxId(id),
            timestamp: Timestamp::from_secs(secs),
        }
    }

    #[test]
    fn test_latest_at() {
        let mut index = TxTimeIndex::new();
        index.add(meta(7, 1000));
        index.add(meta(9, 2000));
        index.add(meta(12, 2000));

        assert_eq!(index.latest_at(Timestamp::from_secs(999)), None);
        assert_eq!(index.latest_at(Timestamp::from_secs(1500)), Some(TxId(7)));
        // Ties on timestamp resolve to the later id
        assert_eq!(index.latest_at(Timestamp::from_secs(2000)), Some(TxId(12)));
        assert_eq!(index.latest().unwrap().id, TxId(12));
    }

    #[test]
    fn test_range_and_prefix() {
        let mut index = TxTimeIndex::new();
        index.add(meta(7, 1000));
        index.add(meta(9, 2000));
        index.add(meta(12, 3000));

        assert_eq!(
            index.find_in_range(Timestamp::from_secs(1500), Timestamp::from_secs(3000)),
            vec![TxId(9)]
        );
        let ids: Vec<_> = index.up_to(TxId(9)).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![TxId(7), TxId(9)]);
        assert!(index.contains(TxId(12)));
        assert!(!index.contains(TxId(8)));
    }
}
