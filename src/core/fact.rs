//! Facts and the transactions that commit them

use crate::core::temporal::Timestamp;
use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier.
///
/// Transactions are entities too; ids come from the same counter as entity
/// ids, so a transaction id is also a valid [`EntityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl TxId {
    /// The entity that carries this transaction's metadata
    pub fn entity(&self) -> EntityId {
        EntityId(self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable assertion or retraction of `(entity, attribute, value)`.
///
/// `attribute` is the entity id of the attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub entity: EntityId,
    pub attribute: EntityId,
    pub value: Value,
    pub tx: TxId,
    pub added: bool,
}

impl Fact {
    /// Create an assertion
    pub fn assert(entity: EntityId, attribute: EntityId, value: Value, tx: TxId) -> Self {
        Self {
            entity,
            attribute,
            value,
            tx,
            added: true,
        }
    }

    /// Create a retraction
    pub fn retract(entity: EntityId, attribute: EntityId, value: Value, tx: TxId) -> Self {
        Self {
            entity,
            attribute,
            value,
            tx,
            added: false,
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.entity, self.attribute, self.value, self.tx, self.added
        )
    }
}

/// Transaction metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMetadata {
    /// Transaction ID
    pub id: TxId,
    /// Wall-clock time the transaction was committed
    pub timestamp: Timestamp,
}

/// A committed transaction: metadata plus its facts in commit order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub metadata: TxMetadata,
    pub facts: Vec<Fact>,
}

impl Transaction {
    pub fn new(id: TxId, timestamp: Timestamp, facts: Vec<Fact>) -> Self {
        Self {
            metadata: TxMetadata { id, timestamp },
            facts,
        }
    }

    /// Get transaction ID
    pub fn id(&self) -> TxId {
        self.metadata.id
    }

    /// Get commit timestamp
    pub fn timestamp(&self) -> Timestamp {
        self.metadata.timestamp
    }

    /// Highest entity id referenced as an entity or reference value
    pub fn max_entity(&self) -> EntityId {
        self.facts
            .iter()
            .flat_map(|f| {
                let r = f.value.as_entity().unwrap_or(EntityId(0));
                [f.entity, r]
            })
            .chain(std::iter::once(self.id().entity()))
            .max()
            .unwrap_or(self.id().entity())
    }
}
