//! Domain layer types and invariants.

pub mod cache;
pub mod error;
pub mod items;
pub mod types;
