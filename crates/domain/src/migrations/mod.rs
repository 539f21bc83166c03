//! Migrations Bounded Context - Domain Layer
//!
//! The MigrationAttempt aggregate, its state machine, and the durable
//! attempt-store port.

pub mod attempt;
pub mod repository;

pub use attempt::*;
pub use repository::*;
