//! Error types for temporal-datalog

use crate::core::fact::{EntityId, TxId};
use crate::core::value::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for temporal-datalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for temporal-datalog
#[derive(Error, Debug)]
pub enum Error {
    /// Attribute definition or usage errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Rejected transactions
    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    /// Invalid historical bounds
    #[error("View error: {0}")]
    View(#[from] ViewError),

    /// Query compilation or evaluation errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// A lookup the caller relied on found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Journal errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Malformed or unregistered attribute usage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Attribute already registered with a different shape
    #[error("attribute {ident} already defined as {existing}, cannot redefine as {requested}")]
    Conflict {
        ident: String,
        existing: String,
        requested: String,
    },

    /// Attribute identifier is not registered
    #[error("unknown attribute {0}")]
    Unknown(String),

    /// Identifier is malformed or uses a reserved namespace
    #[error("invalid attribute definition: {0}")]
    Invalid(String),
}

/// A fact that caused a transaction to be rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFact {
    pub entity: EntityId,
    pub attribute: String,
    pub value: Value,
    pub added: bool,
}

impl fmt::Display for RejectedFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.added { "assert" } else { "retract" };
        write!(f, "[{} {} {} {}]", op, self.entity, self.attribute, self.value)
    }
}

/// Transaction rejected as a whole; nothing was applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// A fact failed validation against the schema or the transaction
    #[error("fact {fact} rejected: {reason}")]
    ValidationFailed { fact: RejectedFact, reason: String },

    /// A unique-identity value is already held by another entity
    #[error("unique value conflict on {fact}: already held by entity {holder}")]
    UniquenessViolation { fact: RejectedFact, holder: EntityId },

    /// Two values asserted for one cardinality-one attribute in a transaction
    #[error("cardinality-one conflict: {first} and {second}")]
    CardinalityViolation {
        first: RejectedFact,
        second: RejectedFact,
    },
}

/// Requested historical bound does not exist
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("transaction {requested} is out of range (latest is {latest})")]
    OutOfRange { requested: TxId, latest: TxId },
}

/// Query compilation and evaluation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A variable is used before anything can bind it
    #[error("unbound variable {0}")]
    UnboundVariable(String),

    /// A pattern names an attribute unknown at the view's bound
    #[error("unknown attribute {0}")]
    UnknownAttribute(String),

    /// A constant cannot appear in the position it was given
    #[error("invalid constant {value} in {position} position")]
    InvalidConstant { value: Value, position: String },

    /// Query text could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Evaluation was cancelled between pattern steps
    #[error("query cancelled")]
    Cancelled,
}
