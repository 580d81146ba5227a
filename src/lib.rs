//! # Oncoguard
//!
//! Role-based clinical workflow core for cancer risk assessment.
//!
//! This crate provides:
//! - User accounts with administrator-approved doctor registration
//! - Doctor-patient assignment requests and approvals
//! - Risk predictions from a frozen gradient-boosted tree model, recorded
//!   as immutable assessment events
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (users, sessions, assignments, predictions)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (SQLite, XGBoost JSON, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{Role, Session, User};

/// Result type for Oncoguard operations
pub type Result<T> = std::result::Result<T, OncoError>;

/// Main error type for Oncoguard.
///
/// `Display` is the short message shown to the user. Storage and model
/// details stay reachable through `source()` and are logged, never shown.
#[derive(Debug, thiserror::Error)]
pub enum OncoError {
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Your account is being verified by the Administrator.")]
    PendingApproval,

    #[error("Username or ID number already exists.")]
    DuplicateKey,

    #[error("{0} not found.")]
    NotFound(String),

    #[error("You have already sent a request to Dr. {doctor}!")]
    AlreadyRequested { doctor: String },

    #[error("{0}")]
    Validation(String),

    #[error("You do not have permission to perform this action.")]
    AccessDenied,

    #[error("This patient is not assigned to you.")]
    NotAssigned,

    #[error("Patient's date of birth is missing. Cannot calculate age.")]
    MissingDateOfBirth,

    #[error("The risk model could not score this assessment.")]
    Scoring(#[from] ports::ScoringError),

    #[error("A database error occurred. Please try again.")]
    Persistence(#[source] adapters::StorageError),

    #[error("Error logging prediction. Please try again.")]
    PredictionNotLogged(#[source] adapters::StorageError),

    #[error("Password could not be processed.")]
    Password(#[from] domain::PasswordError),

    #[error("File access failed.")]
    Io(#[from] std::io::Error),

    #[error("Stored data could not be read.")]
    Serialization(#[from] serde_json::Error),
}

impl From<adapters::StorageError> for OncoError {
    fn from(e: adapters::StorageError) -> Self {
        match e {
            adapters::StorageError::UniqueViolation(_) => Self::DuplicateKey,
            adapters::StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_storage_error_mapping() {
        let dup: OncoError = adapters::StorageError::UniqueViolation("users.username".into()).into();
        assert!(matches!(dup, OncoError::DuplicateKey));

        let missing: OncoError = adapters::StorageError::NotFound("Request".into()).into();
        assert_eq!(missing.to_string(), "Request not found.");

        let poisoned: OncoError = adapters::StorageError::LockPoisoned.into();
        assert!(matches!(poisoned, OncoError::Persistence(_)));
    }

    #[test]
    fn test_persistence_message_hides_raw_error() {
        let err = OncoError::PredictionNotLogged(adapters::StorageError::Corrupt(
            "CHECK constraint failed: predictions".into(),
        ));
        assert_eq!(err.to_string(), "Error logging prediction. Please try again.");
        let source = err.source().expect("source is kept");
        assert!(source.to_string().contains("CHECK constraint failed"));
    }
}
