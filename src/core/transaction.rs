//! Transaction submissions: what callers ask the store to commit

use crate::core::fact::EntityId;
use crate::core::temporal::Timestamp;
use crate::core::value::Value;
use serde::{Deserialize, Serialize};

/// The entity an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// Placeholder resolved to a fresh entity id at commit time
    Temp(String),
    /// An already-allocated entity
    Id(EntityId),
}

impl EntityRef {
    pub fn temp(name: impl Into<String>) -> Self {
        Self::Temp(name.into())
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        Self::Id(id)
    }
}

/// A single value in an operation: either a literal or a temp-id reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSpec {
    Value(Value),
    Temp(String),
}

impl From<Value> for ValueSpec {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// One or several values for an attribute in an assertion map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    One(ValueSpec),
    Many(Vec<ValueSpec>),
}

impl From<ValueSpec> for AttrValue {
    fn from(v: ValueSpec) -> Self {
        Self::One(v)
    }
}

impl From<Value> for AttrValue {
    fn from(v: Value) -> Self {
        Self::One(ValueSpec::Value(v))
    }
}

macro_rules! literal_conversions {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ValueSpec {
                fn from(v: $ty) -> Self {
                    Self::Value(Value::from(v))
                }
            }

            impl From<$ty> for AttrValue {
                fn from(v: $ty) -> Self {
                    Self::One(ValueSpec::Value(Value::from(v)))
                }
            }
        )*
    };
}

literal_conversions!(&str, String, i64, EntityId, Timestamp);

/// A transaction operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOp {
    /// Assertion map keyed by attribute identifier
    Assert {
        entity: EntityRef,
        attributes: Vec<(String, AttrValue)>,
    },
    /// Retract one `(entity, attribute, value)` fact
    Retract {
        entity: EntityRef,
        attribute: String,
        value: ValueSpec,
    },
}

impl TxOp {
    /// Start an assertion map for `entity`
    pub fn assert(entity: impl Into<EntityRef>) -> AssertBuilder {
        AssertBuilder {
            entity: entity.into(),
            attributes: Vec::new(),
        }
    }

    /// Retract a single fact
    pub fn retract(
        entity: impl Into<EntityRef>,
        attribute: impl Into<String>,
        value: impl Into<ValueSpec>,
    ) -> Self {
        Self::Retract {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Builder for [`TxOp::Assert`]
pub struct AssertBuilder {
    entity: EntityRef,
    attributes: Vec<(String, AttrValue)>,
}

impl AssertBuilder {
    /// Add an attribute value
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.push((attribute.into(), value.into()));
        self
    }

    /// Add a reference to another temp-id
    pub fn with_temp_ref(mut self, attribute: impl Into<String>, temp: impl Into<String>) -> Self {
        self.attributes
            .push((attribute.into(), AttrValue::One(ValueSpec::Temp(temp.into()))));
        self
    }

    /// Add several values for a cardinality-many attribute
    pub fn with_many<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ValueSpec>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.attributes.push((attribute.into(), AttrValue::Many(values)));
        self
    }

    /// Build the operation
    pub fn build(self) -> TxOp {
        TxOp::Assert {
            entity: self.entity,
            attributes: self.attributes,
        }
    }
}

impl From<AssertBuilder> for TxOp {
    fn from(builder: AssertBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_builder() {
        let op = TxOp::assert(EntityRef::temp("alice"))
            .with("person/name", "Alice Smith")
            .with("person/age", 30)
            .with_many("person/friends", [EntityId(20), EntityId(21)])
            .build();

        match op {
            TxOp::Assert { entity, attributes } => {
                assert_eq!(entity, EntityRef::Temp("alice".to_string()));
                assert_eq!(attributes.len(), 3);
                assert_eq!(
                    attributes[1].1,
                    AttrValue::One(ValueSpec::Value(Value::Long(30)))
                );
                assert!(matches!(&attributes[2].1, AttrValue::Many(v) if v.len() == 2));
            }
            other => panic!("unexpected op {:?}", other),
        }
    }
}
