//! Fact journal: append-only log of committed transactions

use crate::core::fact::{Fact, Transaction, TxId, TxMetadata};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Trait for fact journal implementations
#[async_trait]
pub trait FactJournal: Send + Sync {
    /// Append a committed transaction.
    ///
    /// Transaction ids must be strictly increasing.
    async fn append(&mut self, tx: Transaction) -> Result<()>;

    /// Get a transaction by id
    async fn get_transaction(&self, id: TxId) -> Result<Option<Arc<Transaction>>>;

    /// Facts of every transaction committed after `bound`, in commit order
    async fn since(&self, bound: TxId) -> Result<Vec<Fact>>;

    /// All transactions in commit order (used for cold start)
    async fn replay(&self) -> Result<Vec<Arc<Transaction>>>;

    /// Metadata of the most recent transaction
    async fn latest(&self) -> Result<Option<TxMetadata>>;

    /// Number of transactions in the log
    async fn len(&self) -> Result<usize>;

    /// Flush pending writes
    async fn flush(&mut self) -> Result<()>;
}

/// In-memory implementation of the fact journal
pub struct InMemoryJournal {
    /// Transactions in commit order
    log: Vec<Arc<Transaction>>,
    /// Map from transaction ID to log offset
    offsets: BTreeMap<TxId, usize>,
}

impl InMemoryJournal {
    /// Create a new in-memory journal
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            offsets: BTreeMap::new(),
        }
    }

    /// Create a journal pre-populated with transactions, e.g. for replay
    pub fn from_transactions(transactions: Vec<Transaction>) -> Result<Self> {
        let mut journal = Self::new();
        for tx in transactions {
            journal.push(tx)?;
        }
        Ok(journal)
    }

    fn push(&mut self, tx: Transaction) -> Result<()> {
        if let Some(last) = self.log.last() {
            if tx.id() <= last.id() {
                return Err(Error::Storage(format!(
                    "transaction {} appended after {}",
                    tx.id(),
                    last.id()
                )));
            }
        }
        self.offsets.insert(tx.id(), self.log.len());
        self.log.push(Arc::new(tx));
        Ok(())
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FactJournal for InMemoryJournal {
    async fn append(&mut self, tx: Transaction) -> Result<()> {
        self.push(tx)
    }

    async fn get_transaction(&self, id: TxId) -> Result<Option<Arc<Transaction>>> {
        Ok(self.offsets.get(&id).map(|&offset| self.log[offset].clone()))
    }

    async fn since(&self, bound: TxId) -> Result<Vec<Fact>> {
        let start = self
            .offsets
            .range((Bound::Excluded(bound), Bound::Unbounded))
            .next()
            .map(|(_, offset)| *offset)
            .unwrap_or(self.log.len());

        Ok(self.log[start..]
            .iter()
            .flat_map(|tx| tx.facts.iter().cloned())
            .collect())
    }

    async fn replay(&self) -> Result<Vec<Arc<Transaction>>> {
        Ok(self.log.clone())
    }

    async fn latest(&self) -> Result<Option<TxMetadata>> {
        Ok(self.log.last().map(|tx| tx.metadata))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.log.len())
    }

    async fn flush(&mut self) -> Result<()> {
        // In-memory journal doesn't need flushing
        Ok(())
    }
}
