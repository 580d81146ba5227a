//! Risk scorer port: Trait for evaluating the frozen risk model.
//!
//! This trait abstracts the model runtime from the prediction workflow.

use crate::domain::ClinicalFeatures;

/// Errors raised while loading or evaluating a risk model.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Model artifact is invalid: {0}")]
    InvalidModel(String),

    #[error("Model integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid features: {0}")]
    InvalidFeatures(String),

    #[error("Model produced an invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for single-row risk scoring.
///
/// Implementations apply the exact preprocessing used at training time and
/// return the probability of the positive (high-risk) class.
pub trait RiskScorer: Send + Sync {
    /// Score one feature row.
    ///
    /// # Errors
    /// Returns `ScoringError` if the model cannot evaluate the row.
    fn score(&self, features: &ClinicalFeatures) -> Result<f64, ScoringError>;

    /// Short identifier of the loaded model (for logs).
    fn model_id(&self) -> &str {
        "unknown"
    }
}
