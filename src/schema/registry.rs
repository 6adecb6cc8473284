//! Schema registry: attribute lookup, conflict detection and schema-as-data

use crate::core::fact::{EntityId, Fact, Transaction, TxId};
use crate::core::value::{Value, ValueType};
use crate::error::SchemaError;
use crate::schema::attribute::{Attribute, Cardinality, RegisteredAttribute, Uniqueness};
use crate::schema::system;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Registered attributes, keyed by identifier and by entity id.
///
/// The registry is a cache over schema facts: every definition is committed
/// as `db/*` facts and [`SchemaRegistry::absorb`] rebuilds entries from them.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    by_ident: HashMap<String, RegisteredAttribute>,
    by_id: HashMap<EntityId, String>,
}

impl SchemaRegistry {
    /// Registry holding only the system attributes
    pub fn bootstrap() -> Self {
        let mut registry = Self {
            by_ident: HashMap::new(),
            by_id: HashMap::new(),
        };
        for (id, attribute) in system::attributes() {
            registry.insert(RegisteredAttribute {
                id,
                defined_in: system::GENESIS_TX,
                attribute,
            });
        }
        registry
    }

    fn insert(&mut self, entry: RegisteredAttribute) {
        self.by_id.insert(entry.id, entry.ident.clone());
        self.by_ident.insert(entry.ident.clone(), entry);
    }

    /// Resolve an identifier against the latest schema
    pub fn resolve(&self, ident: &str) -> Option<&RegisteredAttribute> {
        self.by_ident.get(ident)
    }

    /// Resolve an identifier as the schema stood at `bound`
    pub fn resolve_at(&self, ident: &str, bound: TxId) -> Option<&RegisteredAttribute> {
        self.resolve(ident).filter(|a| a.defined_in <= bound)
    }

    /// Look up an attribute by its entity id
    pub fn by_id(&self, id: EntityId) -> Option<&RegisteredAttribute> {
        self.by_id.get(&id).and_then(|ident| self.by_ident.get(ident))
    }

    /// Identifier for an attribute id, falling back to the numeric id
    pub fn ident_of(&self, id: EntityId) -> String {
        self.by_id
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// All attributes, sorted by identifier
    pub fn attributes(&self) -> Vec<&RegisteredAttribute> {
        let mut all: Vec<_> = self.by_ident.values().collect();
        all.sort_by(|a, b| a.ident.cmp(&b.ident));
        all
    }

    pub fn len(&self) -> usize {
        self.by_ident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ident.is_empty()
    }

    /// Validate a definition against the registry.
    ///
    /// Returns `Ok(true)` when the attribute is new and `Ok(false)` when an
    /// identical definition already exists.
    pub fn check(&self, attribute: &Attribute) -> Result<bool, SchemaError> {
        attribute.validate_ident()?;
        match self.resolve(&attribute.ident) {
            None => Ok(true),
            Some(existing) if existing.shape() == attribute.shape() => Ok(false),
            Some(existing) => Err(SchemaError::Conflict {
                ident: attribute.ident.clone(),
                existing: existing.shape(),
                requested: attribute.shape(),
            }),
        }
    }

    /// The facts that record `attribute` on entity `id`
    pub fn schema_facts(attribute: &Attribute, id: EntityId, tx: TxId) -> Vec<Fact> {
        let mut facts = vec![
            Fact::assert(id, system::IDENT, Value::from(attribute.ident.as_str()), tx),
            Fact::assert(
                id,
                system::VALUE_TYPE,
                Value::from(attribute.value_type.keyword()),
                tx,
            ),
            Fact::assert(
                id,
                system::CARDINALITY,
                Value::from(attribute.cardinality.keyword()),
                tx,
            ),
        ];
        if let Some(unique) = attribute.unique.keyword() {
            facts.push(Fact::assert(id, system::UNIQUE, Value::from(unique), tx));
        }
        if let Some(doc) = &attribute.doc {
            facts.push(Fact::assert(id, system::DOC, Value::from(doc.as_str()), tx));
        }
        facts
    }

    /// Register every attribute defined by the schema facts of `tx`
    pub fn absorb(&mut self, tx: &Transaction) {
        let mut pending: BTreeMap<EntityId, Vec<&Fact>> = BTreeMap::new();
        for fact in tx.facts.iter().filter(|f| f.added && system::is_schema_attribute(f.attribute)) {
            pending.entry(fact.entity).or_default().push(fact);
        }

        for (id, facts) in pending {
            if self.by_id.contains_key(&id) {
                continue;
            }
            match Self::decode(&facts) {
                Some(attribute) => self.insert(RegisteredAttribute {
                    id,
                    defined_in: tx.id(),
                    attribute,
                }),
                None => warn!(entity = %id, tx = %tx.id(), "incomplete attribute definition ignored"),
            }
        }
    }

    fn decode(facts: &[&Fact]) -> Option<Attribute> {
        let text = |attr: EntityId| {
            facts
                .iter()
                .find(|f| f.attribute == attr)
                .and_then(|f| f.value.as_str())
        };

        let ident = text(system::IDENT)?;
        let value_type = ValueType::from_keyword(text(system::VALUE_TYPE)?)?;
        let cardinality = Cardinality::from_keyword(text(system::CARDINALITY)?)?;
        let unique = match text(system::UNIQUE) {
            Some(keyword) => Uniqueness::from_keyword(keyword)?,
            None => Uniqueness::None,
        };

        Some(Attribute {
            ident: ident.to_string(),
            value_type,
            cardinality,
            unique,
            doc: text(system::DOC).map(str::to_string),
        })
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::bootstrap()
    }
}
