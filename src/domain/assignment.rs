//! Doctor-patient linkage.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an assignment row.
///
/// `NONE -> Requested -> Active`, or `Requested -> (deleted)` on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Requested,
    Active,
}

impl AssignmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Active => "active",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// A stored assignment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: i64,
    pub doctor_id: i64,
    pub patient_id: i64,
    pub status: AssignmentStatus,
}

/// An assignment enriched with the patient's names, for a doctor's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub assignment: Assignment,
    pub patient_username: String,
    pub patient_name: String,
}
