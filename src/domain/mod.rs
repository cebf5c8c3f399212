//! Domain layer types and invariants.

pub mod calendar;
pub mod entities;
pub mod error;
pub mod types;
