//! Query engine: pattern queries over database views

pub mod executor;
pub mod parser;
pub mod pattern;

pub use executor::*;
pub use parser::*;
pub use pattern::*;
