//! Immutable database views bound to a transaction

use crate::core::fact::{EntityId, Fact, TxId, TxMetadata};
use crate::core::temporal::Timestamp;
use crate::core::value::Value;
use crate::db::Shared;
use crate::error::{QueryError, SchemaError};
use crate::index::FactIndex;
use crate::query::{self, Inputs, Query, QueryResults};
use crate::schema::RegisteredAttribute;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A read-only snapshot of the database as of a transaction.
///
/// Views share the live index and filter every read by their basis
/// transaction, so holding one copies nothing and later commits never change
/// what it reports.
#[derive(Clone)]
pub struct View {
    shared: Arc<Shared>,
    basis: TxId,
}

impl View {
    pub(crate) fn new(shared: Arc<Shared>, basis: TxId) -> Self {
        Self { shared, basis }
    }

    /// Transaction this view is bound to
    pub fn basis_tx(&self) -> TxId {
        self.basis
    }

    /// Commit time of the basis transaction
    pub fn basis_timestamp(&self) -> Option<Timestamp> {
        self.shared.index.read().transactions().timestamp(self.basis)
    }

    pub(crate) fn with_index<R>(&self, f: impl FnOnce(&FactIndex) -> R) -> R {
        let index = self.shared.index.read();
        f(&index)
    }

    /// Attribute definition as it stood at the basis
    pub fn attribute(&self, ident: &str) -> Option<RegisteredAttribute> {
        self.shared
            .schema
            .read()
            .resolve_at(ident.trim_start_matches(':'), self.basis)
            .cloned()
    }

    /// Identifier of an attribute entity
    pub fn ident_of(&self, attribute: EntityId) -> String {
        self.shared.schema.read().ident_of(attribute)
    }

    /// Live facts matching the given components; `attribute` is an identifier
    pub fn datoms(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&str>,
        value: Option<&Value>,
    ) -> Result<Vec<Fact>, SchemaError> {
        let attribute = match attribute {
            Some(ident) => Some(
                self.attribute(ident)
                    .ok_or_else(|| SchemaError::Unknown(ident.to_string()))?
                    .id,
            ),
            None => None,
        };
        Ok(self.with_index(|index| index.datoms(entity, attribute, value, self.basis)))
    }

    /// Every live attribute value of `entity`, keyed by identifier
    pub fn entity(&self, entity: EntityId) -> BTreeMap<String, Vec<Value>> {
        let facts = self.with_index(|index| index.datoms(Some(entity), None, None, self.basis));
        let schema = self.shared.schema.read();
        let mut out: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for fact in facts {
            out.entry(schema.ident_of(fact.attribute))
                .or_default()
                .push(fact.value);
        }
        out
    }

    /// Entity holding `value` for a unique-identity attribute
    pub fn lookup(&self, ident: &str, value: impl Into<Value>) -> Result<Option<EntityId>, SchemaError> {
        let attribute = self
            .attribute(ident)
            .ok_or_else(|| SchemaError::Unknown(ident.to_string()))?;
        if !attribute.is_unique() {
            return Err(SchemaError::Invalid(format!(
                "{} is not a unique-identity attribute",
                ident
            )));
        }
        let Some(value) = value.into().coerce(attribute.value_type) else {
            return Ok(None);
        };
        Ok(self
            .with_index(|index| index.holders(attribute.id, &value, self.basis))
            .into_iter()
            .next())
    }

    /// Metadata of every transaction visible in this view, oldest first
    pub fn transactions(&self) -> Vec<TxMetadata> {
        self.with_index(|index| index.transactions().up_to(self.basis))
    }

    /// Evaluate a query against this view
    pub fn query(&self, query: &Query, inputs: &Inputs) -> Result<QueryResults, QueryError> {
        query::evaluate(query, self, inputs)
    }

    /// Parse and evaluate query text, collecting every row
    pub fn q(&self, text: &str, inputs: &Inputs) -> Result<Vec<Vec<Value>>, QueryError> {
        let query = Query::parse(text)?;
        self.query(&query, inputs)?.collect()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("basis", &self.basis).finish()
    }
}
