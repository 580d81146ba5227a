//! Prediction result types.
//!
//! Represents the output of the cancer risk model and the persisted
//! assessment event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clinical::ClinicalFeatures;

/// Probabilities strictly below this are Low Risk.
pub const LOW_RISK_THRESHOLD: f64 = 0.4;

/// Probabilities at or above this are High Risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.6;

/// Risk class derived from the model probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskClass {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskClass {
    /// Classify a probability using the fixed thresholds.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability < LOW_RISK_THRESHOLD {
            Self::Low
        } else if probability >= HIGH_RISK_THRESHOLD {
            Self::High
        } else {
            Self::Medium
        }
    }

    /// Stored spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low Risk" => Some(Self::Low),
            "Medium Risk" => Some(Self::Medium),
            "High Risk" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated prediction ready to be inserted. The timestamp is assigned
/// by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrediction {
    pub doctor_id: i64,
    pub patient_id: i64,
    pub features: ClinicalFeatures,
    pub predicted_class: RiskClass,
    pub probability: f64,
}

impl NewPrediction {
    /// Build a prediction whose class is derived from `probability`.
    #[must_use]
    pub fn new(doctor_id: i64, patient_id: i64, features: ClinicalFeatures, probability: f64) -> Self {
        Self {
            doctor_id,
            patient_id,
            features,
            predicted_class: RiskClass::from_probability(probability),
            probability,
        }
    }
}

/// A stored, immutable prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Age snapshot at assessment time; never recomputed.
    pub features: ClinicalFeatures,
    pub predicted_class: RiskClass,
    pub probability: f64,
}

/// A prediction joined with the display names of both parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub prediction: Prediction,
    pub doctor_name: String,
    pub patient_name: String,
}

/// One point of a patient's risk trend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPoint {
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_at_boundaries() {
        assert_eq!(RiskClass::from_probability(0.0), RiskClass::Low);
        assert_eq!(RiskClass::from_probability(0.399_999), RiskClass::Low);
        assert_eq!(RiskClass::from_probability(0.4), RiskClass::Medium);
        assert_eq!(RiskClass::from_probability(0.599_999), RiskClass::Medium);
        assert_eq!(RiskClass::from_probability(0.6), RiskClass::High);
        assert_eq!(RiskClass::from_probability(0.600_001), RiskClass::High);
        assert_eq!(RiskClass::from_probability(1.0), RiskClass::High);
    }

    #[test]
    fn test_stored_spelling() {
        for class in [RiskClass::Low, RiskClass::Medium, RiskClass::High] {
            assert_eq!(RiskClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(RiskClass::High.to_string(), "High Risk");
    }
}
