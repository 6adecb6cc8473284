//! Tagged fact values and the value types attributes declare

use crate::core::fact::EntityId;
use crate::core::temporal::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Value type an attribute accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Long,
    Ref,
    Instant,
}

impl ValueType {
    /// Keyword used when the type is recorded as a schema fact
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::String => "db.type/string",
            Self::Long => "db.type/long",
            Self::Ref => "db.type/ref",
            Self::Instant => "db.type/instant",
        }
    }

    /// Inverse of [`ValueType::keyword`]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "db.type/string" => Some(Self::String),
            "db.type/long" => Some(Self::Long),
            "db.type/ref" => Some(Self::Ref),
            "db.type/instant" => Some(Self::Instant),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A fact value.
///
/// Values are totally ordered (variant first, then payload) so they can key
/// the sorted indexes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Long(i64),
    Ref(EntityId),
    Instant(Timestamp),
}

impl Value {
    /// The value type this value satisfies
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Long(_) => ValueType::Long,
            Self::Ref(_) => ValueType::Ref,
            Self::Instant(_) => ValueType::Instant,
        }
    }

    /// Convert into `expected`, allowing a long to stand in for a reference.
    ///
    /// Returns `None` when the value cannot satisfy the type.
    pub fn coerce(self, expected: ValueType) -> Option<Value> {
        match (self, expected) {
            (Value::Long(n), ValueType::Ref) if n > 0 => Some(Value::Ref(EntityId(n as u64))),
            (v, t) if v.value_type() == t => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Ref(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<Timestamp> {
        match self {
            Self::Instant(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Compare two values of the same variant; `None` across variants
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        if self.value_type() == other.value_type() {
            Some(self.cmp(other))
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            Self::Long(n) => write!(f, "{}", n),
            Self::Ref(e) => write!(f, "{}", e),
            Self::Instant(ts) => write!(f, "#inst {:?}", ts.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<EntityId> for Value {
    fn from(e: EntityId) -> Self {
        Self::Ref(e)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Self::Instant(ts)
    }
}
