//! EAV and AVE indexes over committed facts

use crate::core::fact::{EntityId, Fact, Transaction, TxId, TxMetadata};
use crate::core::value::Value;
use crate::index::history::History;
use crate::index::temporal::TxTimeIndex;
use std::collections::BTreeMap;

type ValueHistories = BTreeMap<Value, History>;
type EntityHistories = BTreeMap<EntityId, History>;

/// Sorted fact indexes, updated incrementally per transaction.
///
/// Both mappings carry the full touch history of every entry, so any bound
/// up to [`FactIndex::basis`] is answered by filtering.
#[derive(Debug, Clone, Default)]
pub struct FactIndex {
    /// entity -> attribute -> value -> history
    eav: BTreeMap<EntityId, BTreeMap<EntityId, ValueHistories>>,
    /// attribute -> value -> entity -> history
    ave: BTreeMap<EntityId, BTreeMap<Value, EntityHistories>>,
    txs: TxTimeIndex,
    basis: Option<TxId>,
}

impl FactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a committed transaction
    pub fn apply(&mut self, tx: &Transaction) {
        for fact in &tx.facts {
            self.eav
                .entry(fact.entity)
                .or_default()
                .entry(fact.attribute)
                .or_default()
                .entry(fact.value.clone())
                .or_default()
                .record(fact.tx, fact.added);
            self.ave
                .entry(fact.attribute)
                .or_default()
                .entry(fact.value.clone())
                .or_default()
                .entry(fact.entity)
                .or_default()
                .record(fact.tx, fact.added);
        }
        self.txs.add(tx.metadata);
        self.basis = Some(tx.id());
    }

    /// Latest transaction applied
    pub fn basis(&self) -> Option<TxId> {
        self.basis
    }

    pub fn transactions(&self) -> &TxTimeIndex {
        &self.txs
    }

    /// Latest committed transaction metadata
    pub fn latest(&self) -> Option<TxMetadata> {
        self.txs.latest()
    }

    /// Facts live at `bound` matching the given components.
    ///
    /// Each returned fact carries the transaction of its live assertion.
    /// Results are ordered by the index that serves the lookup.
    pub fn datoms(
        &self,
        entity: Option<EntityId>,
        attribute: Option<EntityId>,
        value: Option<&Value>,
        bound: TxId,
    ) -> Vec<Fact> {
        let mut out = Vec::new();
        let mut push = |e: EntityId, a: EntityId, v: &Value, history: &History| {
            if let Some(tx) = history.live_at(bound) {
                out.push(Fact::assert(e, a, v.clone(), tx));
            }
        };

        match (entity, attribute) {
            (Some(e), _) => {
                let Some(attrs) = self.eav.get(&e) else {
                    return Vec::new();
                };
                let scan: Box<dyn Iterator<Item = (&EntityId, &ValueHistories)>> = match attribute {
                    Some(a) => Box::new(attrs.get_key_value(&a).into_iter()),
                    None => Box::new(attrs.iter()),
                };
                for (a, values) in scan {
                    match value {
                        Some(v) => {
                            if let Some(h) = values.get(v) {
                                push(e, *a, v, h);
                            }
                        }
                        None => values.iter().for_each(|(v, h)| push(e, *a, v, h)),
                    }
                }
            }
            (None, Some(a)) => {
                let Some(values) = self.ave.get(&a) else {
                    return Vec::new();
                };
                match value {
                    Some(v) => {
                        if let Some(entities) = values.get(v) {
                            entities.iter().for_each(|(e, h)| push(*e, a, v, h));
                        }
                    }
                    None => {
                        for (v, entities) in values {
                            entities.iter().for_each(|(e, h)| push(*e, a, v, h));
                        }
                    }
                }
            }
            (None, None) => match value {
                Some(v) => {
                    for (a, values) in &self.ave {
                        if let Some(entities) = values.get(v) {
                            entities.iter().for_each(|(e, h)| push(*e, *a, v, h));
                        }
                    }
                }
                None => {
                    for (e, attrs) in &self.eav {
                        for (a, values) in attrs {
                            values.iter().for_each(|(v, h)| push(*e, *a, v, h));
                        }
                    }
                }
            },
        }
        out
    }

    /// Values of `attribute` live on `entity` at `bound`
    pub fn values(&self, entity: EntityId, attribute: EntityId, bound: TxId) -> Vec<Value> {
        self.datoms(Some(entity), Some(attribute), None, bound)
            .into_iter()
            .map(|f| f.value)
            .collect()
    }

    /// Entities holding `value` for `attribute` at `bound`
    pub fn holders(&self, attribute: EntityId, value: &Value, bound: TxId) -> Vec<EntityId> {
        self.datoms(None, Some(attribute), Some(value), bound)
            .into_iter()
            .map(|f| f.entity)
            .collect()
    }

    /// Whether `(entity, attribute, value)` is live at `bound`
    pub fn is_live(&self, entity: EntityId, attribute: EntityId, value: &Value, bound: TxId) -> bool {
        self.eav
            .get(&entity)
            .and_then(|attrs| attrs.get(&attribute))
            .and_then(|values| values.get(value))
            .and_then(|h| h.live_at(bound))
            .is_some()
    }
}
