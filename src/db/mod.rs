//! Main database implementation

mod commit;
mod view;

pub use view::View;

use crate::core::fact::{EntityId, Fact, Transaction, TxId};
use crate::core::temporal::Timestamp;
use crate::core::transaction::TxOp;
use crate::core::value::Value;
use crate::error::{Error, Result, SchemaError, ViewError};
use crate::index::FactIndex;
use crate::schema::{system, Attribute, RegisteredAttribute, SchemaRegistry};
use crate::storage::{FactJournal, InMemoryJournal};
use parking_lot::RwLock as SyncRwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// State shared by the database handle and every view
pub(crate) struct Shared {
    pub(crate) index: SyncRwLock<FactIndex>,
    pub(crate) schema: SyncRwLock<SchemaRegistry>,
    /// Next unallocated entity/transaction id
    next_id: AtomicU64,
}

/// Outcome of a committed transaction
#[derive(Debug, Clone)]
pub struct TxReport {
    pub tx_id: TxId,
    pub timestamp: Timestamp,
    /// Entity ids assigned to the transaction's temp-ids
    pub tempids: BTreeMap<String, EntityId>,
    /// Facts appended, including the `tx/instant` fact
    pub tx_data: Vec<Fact>,
    pub db_before: View,
    pub db_after: View,
}

impl TxReport {
    /// Entity id assigned to a temp-id
    pub fn tempid(&self, name: &str) -> Option<EntityId> {
        self.tempids.get(name).copied()
    }
}

/// Handle to a fact store: journal, schema registry and indexes.
///
/// Commits are serialized on the journal's write lock. Cloning the handle is
/// cheap and every clone observes the same store.
#[derive(Clone)]
pub struct Database {
    /// Transaction log; its write guard is the single-writer lock
    journal: Arc<RwLock<dyn FactJournal>>,
    shared: Arc<Shared>,
}

impl Database {
    /// Create a new in-memory database holding only the genesis transaction
    pub fn in_memory() -> Result<Self> {
        let genesis = genesis(Timestamp::now());
        let journal = InMemoryJournal::from_transactions(vec![genesis.clone()])?;
        let db = Self::empty(journal);
        db.apply(&genesis, system::FIRST_USER_ID);
        Ok(db)
    }

    /// Open a database over an existing journal, replaying its log once.
    ///
    /// An empty journal receives the genesis transaction.
    pub async fn open<J: FactJournal + 'static>(journal: J) -> Result<Self> {
        let db = Self::empty(journal);
        let log = db.journal.read().await.replay().await?;

        if log.is_empty() {
            let genesis = genesis(Timestamp::now());
            db.journal.write().await.append(genesis.clone()).await?;
            db.apply(&genesis, system::FIRST_USER_ID);
        } else {
            if log[0].id() != system::GENESIS_TX {
                return Err(Error::Storage(format!(
                    "journal starts at transaction {}, expected genesis {}",
                    log[0].id(),
                    system::GENESIS_TX
                )));
            }
            let mut next_id = system::FIRST_USER_ID;
            for tx in &log {
                next_id = next_id.max(tx.max_entity().0 + 1);
                db.apply(tx, next_id);
            }
        }

        info!(basis = %db.current().basis_tx(), next_id = db.shared.next_id.load(Ordering::SeqCst), "database opened");
        Ok(db)
    }

    fn empty<J: FactJournal + 'static>(journal: J) -> Self {
        Self {
            journal: Arc::new(RwLock::new(journal)),
            shared: Arc::new(Shared {
                index: SyncRwLock::new(FactIndex::new()),
                schema: SyncRwLock::new(SchemaRegistry::bootstrap()),
                next_id: AtomicU64::new(system::FIRST_USER_ID),
            }),
        }
    }

    /// Make a committed transaction visible to new views
    fn apply(&self, tx: &Transaction, next_id: u64) {
        self.shared.schema.write().absorb(tx);
        self.shared.index.write().apply(tx);
        self.shared.next_id.store(next_id, Ordering::SeqCst);
    }

    /// Append `facts` as transaction `tx_id`, stamping `tx/instant`
    async fn commit(
        &self,
        journal: &mut dyn FactJournal,
        tx_id: TxId,
        mut facts: Vec<Fact>,
        next_id: u64,
        tempids: BTreeMap<String, EntityId>,
        db_before: View,
    ) -> Result<TxReport> {
        let previous = db_before.basis_timestamp();
        let timestamp = match previous {
            Some(prev) => Timestamp::now().max(prev),
            None => Timestamp::now(),
        };
        facts.push(Fact::assert(
            tx_id.entity(),
            system::TX_INSTANT,
            Value::Instant(timestamp),
            tx_id,
        ));

        let tx = Transaction::new(tx_id, timestamp, facts);
        journal.append(tx.clone()).await?;
        self.apply(&tx, next_id);

        info!(tx = %tx_id, facts = tx.facts.len(), "transaction committed");
        Ok(TxReport {
            tx_id,
            timestamp,
            tempids,
            tx_data: tx.facts,
            db_before,
            db_after: self.current(),
        })
    }

    /// Install an attribute definition
    pub async fn define(&self, attribute: Attribute) -> Result<TxReport> {
        self.define_all(vec![attribute]).await
    }

    /// Install several attribute definitions in one transaction.
    ///
    /// Identical redefinitions are skipped; conflicting ones reject the whole
    /// batch.
    pub async fn define_all(&self, attributes: Vec<Attribute>) -> Result<TxReport> {
        let mut journal = self.journal.write().await;
        let db_before = self.current();
        let tx_id = TxId(self.shared.next_id.load(Ordering::SeqCst));
        let mut next_id = tx_id.0 + 1;

        let mut facts = Vec::new();
        let mut tempids = BTreeMap::new();
        {
            let schema = self.shared.schema.read();
            let mut batch: HashMap<&str, &Attribute> = HashMap::new();
            for attribute in &attributes {
                if let Some(previous) = batch.get(attribute.ident.as_str()) {
                    if previous.shape() != attribute.shape() {
                        return Err(SchemaError::Conflict {
                            ident: attribute.ident.clone(),
                            existing: previous.shape(),
                            requested: attribute.shape(),
                        }
                        .into());
                    }
                    continue;
                }
                batch.insert(&attribute.ident, attribute);

                if schema.check(attribute)? {
                    let id = EntityId(next_id);
                    next_id += 1;
                    facts.extend(SchemaRegistry::schema_facts(attribute, id, tx_id));
                    tempids.insert(attribute.ident.clone(), id);
                }
            }
        }

        info!(tx = %tx_id, attributes = tempids.len(), "installing schema");
        self.commit(&mut *journal, tx_id, facts, next_id, tempids, db_before)
            .await
    }

    /// Submit a transaction.
    ///
    /// Either every operation is applied or none is; on error the journal
    /// and indexes are unchanged.
    pub async fn transact(&self, ops: Vec<TxOp>) -> Result<TxReport> {
        let mut journal = self.journal.write().await;
        let db_before = self.current();
        let basis = db_before.basis_tx();
        let tx_id = TxId(self.shared.next_id.load(Ordering::SeqCst));

        let prepared = {
            let schema = self.shared.schema.read();
            let index = self.shared.index.read();
            commit::prepare(&ops, tx_id, &schema, &index, basis)
        };
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(tx = %tx_id, error = %e, "transaction rejected");
                return Err(e);
            }
        };

        debug!(tx = %tx_id, ops = ops.len(), tempids = prepared.tempids.len(), "transaction prepared");
        self.commit(
            &mut *journal,
            tx_id,
            prepared.facts,
            prepared.next_id,
            prepared.tempids,
            db_before,
        )
        .await
    }

    /// View of the latest committed state
    pub fn current(&self) -> View {
        let basis = self.shared.index.read().basis().unwrap_or(system::GENESIS_TX);
        View::new(self.shared.clone(), basis)
    }

    /// View bound to transaction `tx`
    pub fn as_of(&self, tx: TxId) -> std::result::Result<View, ViewError> {
        let index = self.shared.index.read();
        let latest = index.basis().unwrap_or(system::GENESIS_TX);
        if tx > latest || !index.transactions().contains(tx) {
            return Err(ViewError::OutOfRange {
                requested: tx,
                latest,
            });
        }
        debug!(basis = %tx, "as-of view");
        Ok(View::new(self.shared.clone(), tx))
    }

    /// View bound to the latest transaction committed at or before `timestamp`
    pub fn as_of_instant(&self, timestamp: Timestamp) -> std::result::Result<View, ViewError> {
        let index = self.shared.index.read();
        let latest = index.basis().unwrap_or(system::GENESIS_TX);
        match index.transactions().latest_at(timestamp) {
            Some(tx) => Ok(View::new(self.shared.clone(), tx)),
            None => Err(ViewError::OutOfRange {
                requested: TxId(0),
                latest,
            }),
        }
    }

    /// Facts committed after `tx`, in commit order
    pub async fn since(&self, tx: TxId) -> Result<Vec<Fact>> {
        self.journal.read().await.since(tx).await
    }

    /// Attribute definition by identifier
    pub fn resolve(&self, ident: &str) -> Option<RegisteredAttribute> {
        self.shared.schema.read().resolve(ident).cloned()
    }

    /// Every registered attribute, sorted by identifier
    pub fn attributes(&self) -> Vec<RegisteredAttribute> {
        self.shared
            .schema
            .read()
            .attributes()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Flush pending journal writes
    pub async fn flush(&self) -> Result<()> {
        self.journal.write().await.flush().await
    }
}

/// The first transaction: schema facts for the system attributes
fn genesis(timestamp: Timestamp) -> Transaction {
    let tx = system::GENESIS_TX;
    let mut facts: Vec<Fact> = system::attributes()
        .iter()
        .flat_map(|(id, attribute)| SchemaRegistry::schema_facts(attribute, *id, tx))
        .collect();
    facts.push(Fact::assert(
        tx.entity(),
        system::TX_INSTANT,
        Value::Instant(timestamp),
        tx,
    ));
    Transaction::new(tx, timestamp, facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::EntityRef;
    use crate::core::value::ValueType;
    use crate::error::TxError;

    async fn people() -> Database {
        let db = Database::in_memory().unwrap();
        db.define_all(vec![
            Attribute::new("person/name", ValueType::String),
            Attribute::new("person/email", ValueType::String).unique_identity(),
            Attribute::new("person/age", ValueType::Long),
            Attribute::new("person/friends", ValueType::Ref).many(),
        ])
        .await
        .unwrap();
        db
    }

    fn person(temp: &str, name: &str, age: i64) -> TxOp {
        TxOp::assert(EntityRef::temp(temp))
            .with("person/name", name)
            .with("person/email", format!("{}@example.com", temp))
            .with("person/age", age)
            .build()
    }

    #[tokio::test]
    async fn test_genesis_state() {
        let db = Database::in_memory().unwrap();
        let view = db.current();
        assert_eq!(view.basis_tx(), system::GENESIS_TX);
        assert_eq!(view.transactions().len(), 1);
        assert_eq!(
            view.entity(system::IDENT).get("db/ident"),
            Some(&vec![Value::from("db/ident")])
        );
    }

    #[tokio::test]
    async fn test_tempids_and_ids_increase() {
        let db = people().await;
        let report = db
            .transact(vec![person("alice", "Alice", 30), person("bob", "Bob", 35)])
            .await
            .unwrap();

        let alice = report.tempid("alice").unwrap();
        let bob = report.tempid("bob").unwrap();
        assert!(report.tx_id.0 < alice.0 && alice.0 < bob.0);
        assert_eq!(report.db_before.basis_tx().0 + 5, report.tx_id.0);
        assert_eq!(report.db_after.basis_tx(), report.tx_id);
        // 3 facts per person plus tx/instant
        assert_eq!(report.tx_data.len(), 7);

        let next = db.transact(vec![person("carol", "Carol", 40)]).await.unwrap();
        assert!(next.tx_id.0 > bob.0);
        assert!(next.timestamp >= report.timestamp);
    }

    #[tokio::test]
    async fn test_define_conflict_and_idempotence() {
        let db = people().await;
        let basis = db.current().basis_tx();

        let same = db
            .define(Attribute::new("person/age", ValueType::Long).doc("Age in years"))
            .await
            .unwrap();
        assert!(same.tempids.is_empty());

        let conflict = db.define(Attribute::new("person/age", ValueType::String)).await;
        assert!(matches!(
            conflict,
            Err(Error::Schema(SchemaError::Conflict { .. }))
        ));
        assert_eq!(db.current().basis_tx(), same.tx_id);
        assert!(same.tx_id > basis);

        let reserved = db.define(Attribute::new("db/custom", ValueType::String)).await;
        assert!(matches!(reserved, Err(Error::Schema(SchemaError::Invalid(_)))));
    }

    #[tokio::test]
    async fn test_schema_is_time_travelable() {
        let db = Database::in_memory().unwrap();
        let before = db.current().basis_tx();
        db.define(Attribute::new("person/name", ValueType::String))
            .await
            .unwrap();

        assert!(db.current().attribute("person/name").is_some());
        assert!(db.as_of(before).unwrap().attribute("person/name").is_none());
        let facts = db
            .current()
            .datoms(None, Some("db/ident"), Some(&Value::from("person/name")))
            .unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_attribute_rejected() {
        let db = people().await;
        let basis = db.current().basis_tx();
        let result = db
            .transact(vec![TxOp::assert(EntityRef::temp("x"))
                .with("person/height", 180i64)
                .build()])
            .await;
        assert!(matches!(result, Err(Error::Schema(SchemaError::Unknown(ref a))) if a == "person/height"));
        assert_eq!(db.current().basis_tx(), basis);
    }

    #[tokio::test]
    async fn test_validation_failures_are_atomic() {
        let db = people().await;
        let basis = db.current().basis_tx();

        let cases = vec![
            // wrong value type
            vec![TxOp::assert(EntityRef::temp("a")).with("person/age", "old").build()],
            // reference to an unallocated entity
            vec![TxOp::assert(EntityRef::temp("a"))
                .with("person/friends", EntityId(9_999))
                .build()],
            // reserved attribute
            vec![TxOp::assert(EntityRef::temp("a")).with("db/doc", "x").build()],
            // dangling temp reference
            vec![TxOp::assert(EntityRef::temp("a"))
                .with_temp_ref("person/friends", "ghost")
                .build()],
            // assert and retract in one transaction
            vec![
                person("a", "A", 1),
                TxOp::retract(EntityId(basis.0 - 1), "person/age", 1i64),
                TxOp::assert(EntityId(basis.0 - 1)).with("person/age", 1i64).build(),
            ],
        ];
        for ops in cases {
            let result = db.transact(ops).await;
            assert!(
                matches!(result, Err(Error::Transaction(TxError::ValidationFailed { .. }))),
                "unexpected {:?}",
                result.map(|r| r.tx_id)
            );
            assert_eq!(db.current().basis_tx(), basis);
        }

        // The failed attempts consumed no ids: the schema tx allocated four
        let report = db.transact(vec![person("a", "A", 1)]).await.unwrap();
        assert_eq!(report.tx_id.0, basis.0 + 5);
    }

    #[tokio::test]
    async fn test_cardinality_one_within_transaction() {
        let db = people().await;
        let result = db
            .transact(vec![TxOp::assert(EntityRef::temp("a"))
                .with("person/age", 30i64)
                .with("person/age", 31i64)
                .build()])
            .await;
        assert!(matches!(
            result,
            Err(Error::Transaction(TxError::CardinalityViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_redundant_facts_are_elided() {
        let db = people().await;
        let report = db.transact(vec![person("alice", "Alice", 30)]).await.unwrap();
        let alice = report.tempid("alice").unwrap();

        let again = db
            .transact(vec![TxOp::assert(alice).with("person/age", 30i64).build()])
            .await
            .unwrap();
        // Only tx/instant
        assert_eq!(again.tx_data.len(), 1);

        let noop = db
            .transact(vec![TxOp::retract(alice, "person/age", 99i64)])
            .await
            .unwrap();
        assert_eq!(noop.tx_data.len(), 1);
    }

    #[tokio::test]
    async fn test_as_of_bounds() {
        let db = people().await;
        db.transact(vec![person("alice", "Alice", 30)]).await.unwrap();
        let latest = db.current().basis_tx();

        assert!(db.as_of(latest).is_ok());
        assert!(db.as_of(system::GENESIS_TX).is_ok());
        assert_eq!(
            db.as_of(TxId(latest.0 + 100)).unwrap_err(),
            ViewError::OutOfRange {
                requested: TxId(latest.0 + 100),
                latest,
            }
        );
        // An entity id is not a transaction
        let age = db.resolve("person/age").unwrap().id;
        assert!(db.as_of(TxId(age.0)).is_err());
    }

    #[tokio::test]
    async fn test_as_of_instant() {
        let db = people().await;
        let first = db.current();
        let ts = first.basis_timestamp().unwrap();

        assert_eq!(db.as_of_instant(ts).unwrap().basis_tx(), first.basis_tx());
        assert!(db.as_of_instant(Timestamp::from_secs(0)).is_err());
    }

    #[tokio::test]
    async fn test_since() {
        let db = people().await;
        let t1 = db.transact(vec![person("alice", "Alice", 30)]).await.unwrap();
        let t2 = db.transact(vec![person("bob", "Bob", 35)]).await.unwrap();

        let facts = db.since(t1.tx_id).await.unwrap();
        assert_eq!(facts.len(), t2.tx_data.len());
        assert!(facts.iter().all(|f| f.tx == t2.tx_id));
    }

    #[tokio::test]
    async fn test_cold_start_replays_log() {
        let db = people().await;
        let report = db.transact(vec![person("alice", "Alice", 30)]).await.unwrap();
        let alice = report.tempid("alice").unwrap();

        let log = db.journal.read().await.replay().await.unwrap();
        let journal =
            InMemoryJournal::from_transactions(log.iter().map(|tx| (**tx).clone()).collect())
                .unwrap();
        let reopened = Database::open(journal).await.unwrap();

        assert_eq!(reopened.current().basis_tx(), report.tx_id);
        assert_eq!(
            reopened.current().lookup("person/email", "alice@example.com").unwrap(),
            Some(alice)
        );
        let next = reopened.transact(vec![person("bob", "Bob", 35)]).await.unwrap();
        assert!(next.tx_id.0 > alice.0);
    }

    #[tokio::test]
    async fn test_open_empty_journal_writes_genesis() {
        let db = Database::open(InMemoryJournal::new()).await.unwrap();
        assert_eq!(db.current().basis_tx(), system::GENESIS_TX);
        assert!(db.resolve("tx/instant").is_some());
        assert_eq!(db.attributes().len(), 6);
    }
}
