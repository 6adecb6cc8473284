//! Temporal-Datalog: append-only, time-indexed fact store
//!
//! Facts are `(entity, attribute, value, tx, added)` tuples. Nothing is ever
//! overwritten: retractions are new facts, and any past state can be read
//! back through a view bound to a transaction.
//!
//! # Core Concepts
//!
//! - **Attributes**: typed, schema-registered fact keys, stored as facts
//! - **Transactions**: atomic batches of assertions and retractions
//! - **Views**: immutable database values as of a transaction
//! - **Queries**: conjunctive datalog patterns with comparison predicates
//!
//! # Example
//!
//! ```no_run
//! use temporal_datalog::prelude::*;
//!
//! # async fn example() -> temporal_datalog::error::Result<()> {
//! let db = Database::in_memory()?;
//! db.define(Attribute::new("person/age", ValueType::Long)).await?;
//!
//! let report = db
//!     .transact(vec![TxOp::assert(EntityRef::temp("alice"))
//!         .with("person/age", 30i64)
//!         .build()])
//!     .await?;
//!
//! let rows = db
//!     .as_of(report.tx_id)?
//!     .q("[:find ?e ?age :where [?e :person/age ?age]]", &Inputs::new())?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod storage;

/// Main database type
pub mod db;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::*;
    pub use crate::db::{Database, TxReport, View};
    pub use crate::error::{Error, Result};
    pub use crate::query::{CompareOp, Inputs, Pattern, Query};
    pub use crate::schema::{Attribute, Cardinality, Uniqueness};
    pub use crate::storage::*;
}
