//! Per-entry assertion history

use crate::core::fact::TxId;

/// Ascending list of `(tx, added)` touches for one `(entity, attribute, value)`.
///
/// An entry is live at a bound when its last touch at or before the bound
/// is an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    touches: Vec<(TxId, bool)>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a touch; transactions arrive in increasing order
    pub fn record(&mut self, tx: TxId, added: bool) {
        debug_assert!(self.touches.last().map_or(true, |(last, _)| *last <= tx));
        self.touches.push((tx, added));
    }

    /// Last touch at or before `bound`
    pub fn state_at(&self, bound: TxId) -> Option<(TxId, bool)> {
        let idx = self.touches.partition_point(|(tx, _)| *tx <= bound);
        idx.checked_sub(1).map(|i| self.touches[i])
    }

    /// Transaction of the live assertion at `bound`, if the entry is live
    pub fn live_at(&self, bound: TxId) -> Option<TxId> {
        match self.state_at(bound) {
            Some((tx, true)) => Some(tx),
            _ => None,
        }
    }

    /// Transaction that last touched this entry
    pub fn last_touched(&self) -> Option<TxId> {
        self.touches.last().map(|(tx, _)| *tx)
    }

    pub fn len(&self) -> usize {
        self.touches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.touches.is_empty()
    }
}
