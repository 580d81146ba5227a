//! Prediction service: scores an assessment and records it.
//!
//! The recorder coordinates:
//! - Access checks (role, active assignment)
//! - Age derivation from the patient's date of birth
//! - Feature validation and scoring through the [`RiskScorer`] port
//! - Persistence and history queries through the [`ClinicStore`] port

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::adapters::StorageError;
use crate::domain::{
    age_on, ClinicalInput, NewPrediction, Prediction, PredictionRecord, RiskPoint, Role, Session,
};
use crate::ports::{ClinicStore, RiskScorer, ScoringError};
use crate::{OncoError, Result};

use super::{require_role, store_err, store_err_for};

/// Service for logging and browsing risk predictions.
pub struct PredictionRecorder<S, R>
where
    S: ClinicStore,
    R: RiskScorer,
{
    store: Arc<S>,
    scorer: Arc<R>,
    /// Fixed assessment date; `None` reads the local clock.
    today: Option<NaiveDate>,
}

impl<S, R> PredictionRecorder<S, R>
where
    S: ClinicStore,
    S::Error: Into<StorageError>,
    R: RiskScorer,
{
    pub fn new(store: Arc<S>, scorer: Arc<R>) -> Self {
        Self {
            store,
            scorer,
            today: None,
        }
    }

    /// Pin the date used for age derivation.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn ensure_assigned(&self, doctor_id: i64, patient_id: i64) -> Result<()> {
        if self
            .store
            .has_active_assignment(doctor_id, patient_id)
            .map_err(store_err)?
        {
            Ok(())
        } else {
            tracing::warn!(doctor_id, patient_id, "Refused access to unassigned patient");
            Err(OncoError::NotAssigned)
        }
    }

    /// Score `input` for an assigned patient and persist the result.
    ///
    /// The age is derived from the patient's date of birth as of today and
    /// stored as a snapshot.
    ///
    /// # Errors
    /// - `AccessDenied` if the session is not a doctor's
    /// - `NotFound` if `patient_id` is not a patient
    /// - `NotAssigned` without an active assignment for the pair
    /// - `MissingDateOfBirth` if the patient has no usable date of birth
    /// - `Validation` for out-of-range inputs
    /// - `Scoring` if the model fails or yields an invalid probability
    /// - `PredictionNotLogged` if the record cannot be stored
    pub fn predict_and_log(
        &self,
        session: &Session,
        patient_id: i64,
        input: ClinicalInput,
    ) -> Result<Prediction> {
        require_role(session, Role::Doctor)?;
        let patient = self
            .store
            .find_user(patient_id)
            .map_err(store_err)?
            .filter(|u| u.role == Role::Patient)
            .ok_or_else(|| OncoError::NotFound("Patient".into()))?;
        self.ensure_assigned(session.user_id, patient_id)?;

        let dob = patient.dob.ok_or(OncoError::MissingDateOfBirth)?;
        let age = age_on(dob, self.today()).ok_or(OncoError::MissingDateOfBirth)?;

        let features = input.with_age(age);
        features
            .validate()
            .map_err(|errors| OncoError::Validation(errors.join("; ")))?;

        let probability = self.scorer.score(&features)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::InvalidProbability(probability).into());
        }

        let new_prediction = NewPrediction::new(session.user_id, patient_id, features, probability);
        let prediction = match self.store.insert_prediction(&new_prediction) {
            Ok(prediction) => prediction,
            Err(e) => {
                let e: StorageError = e.into();
                tracing::error!(
                    doctor_id = session.user_id,
                    patient_id,
                    "Failed to log prediction: {}",
                    e
                );
                return Err(OncoError::PredictionNotLogged(e));
            }
        };

        tracing::info!(
            prediction_id = prediction.prediction_id,
            doctor_id = session.user_id,
            patient_id,
            model = self.scorer.model_id(),
            class = prediction.predicted_class.as_str(),
            "Prediction logged"
        );
        Ok(prediction)
    }

    /// The session patient's own history, newest first, optionally narrowed
    /// to doctors whose name contains `doctor_filter`.
    ///
    /// # Errors
    /// `AccessDenied` for non-patients, or a storage failure.
    pub fn patient_history(
        &self,
        session: &Session,
        doctor_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>> {
        require_role(session, Role::Patient)?;
        self.store
            .patient_history(session.user_id, doctor_filter)
            .map_err(store_err)
    }

    /// Predictions the session doctor has logged, newest first.
    ///
    /// # Errors
    /// `AccessDenied` for non-doctors, or a storage failure.
    pub fn doctor_records(
        &self,
        session: &Session,
        patient_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>> {
        require_role(session, Role::Doctor)?;
        self.store
            .doctor_records(session.user_id, patient_filter)
            .map_err(store_err)
    }

    /// A patient's full history across all doctors, for a doctor the patient
    /// is actively assigned to.
    ///
    /// # Errors
    /// `AccessDenied` for non-doctors; `NotAssigned` without an active
    /// assignment.
    pub fn patient_history_for_doctor(
        &self,
        session: &Session,
        patient_id: i64,
    ) -> Result<Vec<PredictionRecord>> {
        require_role(session, Role::Doctor)?;
        self.ensure_assigned(session.user_id, patient_id)?;
        self.store
            .patient_history(patient_id, None)
            .map_err(store_err)
    }

    /// # Errors
    /// `NotFound` if the prediction does not exist or the session is not
    /// allowed to see it.
    pub fn prediction_detail(&self, session: &Session, prediction_id: i64) -> Result<PredictionRecord> {
        let record = self
            .store
            .find_prediction(prediction_id)
            .map_err(store_err_for("Prediction"))?
            .ok_or_else(|| OncoError::NotFound("Prediction".into()))?;

        let visible = match session.role {
            Role::Admin => true,
            Role::Doctor => record.prediction.doctor_id == session.user_id,
            Role::Patient => record.prediction.patient_id == session.user_id,
        };
        if visible {
            Ok(record)
        } else {
            Err(OncoError::NotFound("Prediction".into()))
        }
    }

    /// Oldest-first probability series for charting a patient's risk.
    ///
    /// Doctors need an active assignment; patients may chart only
    /// themselves.
    ///
    /// # Errors
    /// `AccessDenied` or `NotAssigned` per the rules above.
    pub fn risk_trend(&self, session: &Session, patient_id: i64) -> Result<Vec<RiskPoint>> {
        match session.role {
            Role::Doctor => self.ensure_assigned(session.user_id, patient_id)?,
            Role::Patient if session.user_id == patient_id => {}
            Role::Patient | Role::Admin => return Err(OncoError::AccessDenied),
        }

        let history = self
            .store
            .patient_history(patient_id, None)
            .map_err(store_err)?;
        Ok(history
            .iter()
            .rev()
            .map(|r| RiskPoint {
                timestamp: r.prediction.timestamp,
                probability: r.prediction.probability,
            })
            .collect())
    }
}
