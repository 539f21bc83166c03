//! Audit Bounded Context - Application Layer

pub mod service;

pub use service::*;
