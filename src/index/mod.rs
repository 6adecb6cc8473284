//! Indexing for point-in-time queries

pub mod fact;
pub mod history;
pub mod temporal;

pub use fact::*;
pub use history::*;
pub use temporal::*;
