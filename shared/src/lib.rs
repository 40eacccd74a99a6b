//! Shared types and models for the SupplyMate inventory platform
//!
//! This crate holds the domain model and the pure rules of the stock ledger,
//! the order lifecycle and the reporting buckets. It performs no I/O; the
//! backend wraps these rules in database transactions.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
