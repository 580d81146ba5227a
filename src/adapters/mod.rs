//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `sqlite`: SQLite (rusqlite) for the clinic store
//! - `xgboost`: evaluator for the exported gradient-boosted tree model
//! - `sanitize`: credential and identifier filtering for logs

pub mod sanitize;
pub mod sqlite;
pub mod xgboost;

// Re-export storage error for lib.rs
pub use sqlite::StorageError;
