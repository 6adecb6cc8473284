//! Storage layer: the append-only transaction log

pub mod journal;

pub use journal::*;
