//! Persistence adapters

pub mod in_memory;
pub mod postgres;

pub use postgres::*;
