//! Core data types and models

pub mod fact;
pub mod temporal;
pub mod transaction;
pub mod value;

pub use fact::*;
pub use temporal::*;
pub use transaction::*;
pub use value::*;
