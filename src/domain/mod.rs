//! Domain layer: Core business types and logic.
//!
//! Pure types with no storage or model dependencies. Enumerations carry
//! their persisted spellings.

mod assignment;
pub mod clinical;
pub mod password;
mod prediction;
mod session;
mod user;

pub use assignment::{Assignment, AssignmentRequest, AssignmentStatus};
pub use clinical::{
    age_on, CancerStage, ClinicalFeatures, ClinicalInput, Comorbidities, Metastasis,
    TreatmentType, TumorType,
};
pub use password::{DigestScheme, PasswordDigest, PasswordError};
pub use prediction::{
    NewPrediction, Prediction, PredictionRecord, RiskClass, RiskPoint, HIGH_RISK_THRESHOLD,
    LOW_RISK_THRESHOLD,
};
pub use session::{Session, Workspace};
pub use user::{
    check_identifier_lengths, NewUser, Role, SignUp, User, UserCredentials, UserStatus, UserUpdate,
};
