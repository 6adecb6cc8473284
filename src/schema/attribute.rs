//! Attribute definitions

use crate::core::fact::{EntityId, TxId};
use crate::core::value::ValueType;
use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an attribute holds one current value per entity or a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::One => "db.cardinality/one",
            Self::Many => "db.cardinality/many",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "db.cardinality/one" => Some(Self::One),
            "db.cardinality/many" => Some(Self::Many),
            _ => None,
        }
    }
}

/// Uniqueness constraint on an attribute's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uniqueness {
    #[default]
    None,
    /// At most one entity holds a given value among current facts
    Identity,
}

impl Uniqueness {
    /// Keyword recorded as a schema fact; `None` records nothing
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Identity => Some("db.unique/identity"),
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "db.unique/identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// An attribute definition as submitted to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Namespaced identifier, e.g. `person/name`
    pub ident: String,
    pub value_type: ValueType,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub unique: Uniqueness,
    #[serde(default)]
    pub doc: Option<String>,
}

impl Attribute {
    /// Create a cardinality-one, non-unique attribute
    pub fn new(ident: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            ident: ident.into(),
            value_type,
            cardinality: Cardinality::One,
            unique: Uniqueness::None,
            doc: None,
        }
    }

    /// Set cardinality
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Shorthand for cardinality-many
    pub fn many(self) -> Self {
        self.cardinality(Cardinality::Many)
    }

    /// Mark values as unique identities
    pub fn unique_identity(mut self) -> Self {
        self.unique = Uniqueness::Identity;
        self
    }

    /// Attach documentation
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn is_unique(&self) -> bool {
        self.unique == Uniqueness::Identity
    }

    /// Type, cardinality and uniqueness; documentation is not part of the shape
    pub(crate) fn shape(&self) -> String {
        match self.unique.keyword() {
            Some(unique) => format!(
                "{} {} {}",
                self.value_type,
                self.cardinality.keyword(),
                unique
            ),
            None => format!("{} {}", self.value_type, self.cardinality.keyword()),
        }
    }

    /// Check that the identifier is `namespace/name` outside reserved namespaces
    pub fn validate_ident(&self) -> Result<(), SchemaError> {
        validate_ident(&self.ident)?;
        let namespace = self.ident.split('/').next().unwrap_or_default();
        if is_reserved_namespace(namespace) {
            return Err(SchemaError::Invalid(format!(
                "{} uses the reserved namespace {}",
                self.ident, namespace
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_ident(ident: &str) -> Result<(), SchemaError> {
    let well_formed = match ident.split_once('/') {
        Some((ns, name)) => {
            !ns.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && ident.chars().all(|c| c.is_alphanumeric() || "/-_.?*!+".contains(c))
        }
        None => false,
    };
    if well_formed {
        Ok(())
    } else {
        Err(SchemaError::Invalid(format!(
            "{:?} is not a namespace/name identifier",
            ident
        )))
    }
}

pub(crate) fn is_reserved_namespace(namespace: &str) -> bool {
    namespace == "db" || namespace.starts_with("db.") || namespace == "tx"
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ident, self.shape())
    }
}

/// An attribute after registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredAttribute {
    /// Entity carrying the attribute's schema facts
    pub id: EntityId,
    /// Transaction that installed the definition
    pub defined_in: TxId,
    pub attribute: Attribute,
}

impl std::ops::Deref for RegisteredAttribute {
    type Target = Attribute;

    fn deref(&self) -> &Attribute {
        &self.attribute
    }
}
