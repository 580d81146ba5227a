//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (relational store, model
//! runtime).

mod risk_scorer;
mod storage;

pub use risk_scorer::{RiskScorer, ScoringError};
pub use storage::{ClinicStore, Page};
