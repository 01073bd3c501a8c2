//! Domain layer types and invariants.

pub mod canonical;
pub mod entities;
pub mod error;
pub mod fingerprint;
pub mod schema;
pub mod types;
