//! Assignment service: the doctor-patient linkage state machine.
//!
//! Per (doctor, patient) pair: `none -> requested -> active`, or
//! `requested -> none` on rejection. Active assignments are never demoted.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{AssignmentRequest, AssignmentStatus, Role, Session, User};
use crate::ports::ClinicStore;
use crate::{OncoError, Result};

use super::{require_role, store_err, store_err_for};

/// Service coordinating assignment requests between patients and doctors.
pub struct AssignmentManager<S>
where
    S: ClinicStore,
{
    store: Arc<S>,
}

impl<S> AssignmentManager<S>
where
    S: ClinicStore,
    S::Error: Into<StorageError>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn active_doctor(&self, doctor_id: i64) -> Result<User> {
        self.store
            .find_user(doctor_id)
            .map_err(store_err)?
            .filter(|u| u.role == Role::Doctor && u.is_active())
            .ok_or_else(|| OncoError::NotFound("Doctor".into()))
    }

    fn patient_name(&self, patient_id: i64) -> Result<String> {
        Ok(self
            .store
            .find_user(patient_id)
            .map_err(store_err)?
            .map(|u| u.full_name)
            .unwrap_or_default())
    }

    /// Patient asks an active doctor to take them on.
    ///
    /// # Errors
    /// `AccessDenied` for non-patients; `NotFound` if the doctor is not an
    /// active doctor; `AlreadyRequested` if any assignment exists for the pair.
    pub fn request(&self, session: &Session, doctor_id: i64) -> Result<String> {
        require_role(session, Role::Patient)?;
        let doctor = self.active_doctor(doctor_id)?;

        match self.store.create_assignment_request(doctor_id, session.user_id) {
            Ok(assignment) => {
                tracing::info!(
                    assignment_id = assignment.assignment_id,
                    doctor_id,
                    patient_id = session.user_id,
                    "Assignment requested"
                );
                Ok(format!(
                    "Connection request to Dr. {} sent successfully!",
                    doctor.full_name
                ))
            }
            Err(e) => match e.into() {
                StorageError::UniqueViolation(_) => Err(OncoError::AlreadyRequested {
                    doctor: doctor.full_name,
                }),
                other => Err(OncoError::from(other)),
            },
        }
    }

    /// Doctor accepts a pending request. Approving an active assignment is
    /// a no-op that still succeeds.
    ///
    /// # Errors
    /// `AccessDenied` for non-doctors; `NotFound` if the request does not
    /// exist or belongs to another doctor.
    pub fn approve(&self, session: &Session, assignment_id: i64) -> Result<String> {
        require_role(session, Role::Doctor)?;
        let assignment = self
            .store
            .find_assignment(assignment_id)
            .map_err(store_err)?
            .filter(|a| a.doctor_id == session.user_id)
            .ok_or_else(|| OncoError::NotFound("Request".into()))?;
        let patient_name = self.patient_name(assignment.patient_id)?;

        if assignment.status == AssignmentStatus::Requested {
            self.store
                .activate_assignment(assignment_id)
                .map_err(store_err_for("Request"))?;
            tracing::info!(assignment_id, doctor_id = session.user_id, "Assignment approved");
        }

        Ok(format!("Patient {patient_name}'s request approved."))
    }

    /// Doctor declines a pending request, deleting it.
    ///
    /// # Errors
    /// `AccessDenied` for non-doctors; `NotFound` if the request does not
    /// exist or belongs to another doctor; `Validation` for an active
    /// assignment.
    pub fn reject(&self, session: &Session, assignment_id: i64) -> Result<String> {
        require_role(session, Role::Doctor)?;
        let assignment = self
            .store
            .find_assignment(assignment_id)
            .map_err(store_err)?
            .filter(|a| a.doctor_id == session.user_id)
            .ok_or_else(|| OncoError::NotFound("Request".into()))?;
        if assignment.status == AssignmentStatus::Active {
            return Err(OncoError::Validation(
                "This patient is already assigned to you and cannot be rejected.".into(),
            ));
        }
        let patient_name = self.patient_name(assignment.patient_id)?;

        self.store
            .delete_assignment_request(assignment_id)
            .map_err(store_err_for("Request"))?;
        tracing::info!(assignment_id, doctor_id = session.user_id, "Assignment rejected");

        Ok(format!("Patient {patient_name}'s request rejected."))
    }

    /// Active doctors the patient has no assignment with, optionally
    /// narrowed by display name.
    ///
    /// # Errors
    /// `AccessDenied` for non-patients, or a storage failure.
    pub fn find_available_doctors(
        &self,
        session: &Session,
        name_filter: Option<&str>,
    ) -> Result<Vec<User>> {
        require_role(session, Role::Patient)?;
        self.store
            .available_doctors(session.user_id, name_filter)
            .map_err(store_err)
    }

    /// # Errors
    /// `AccessDenied` for non-doctors, or a storage failure.
    pub fn list_assigned_patients(&self, session: &Session) -> Result<Vec<User>> {
        require_role(session, Role::Doctor)?;
        self.store
            .assigned_patients(session.user_id)
            .map_err(store_err)
    }

    /// The doctor's inbox of requested assignments.
    ///
    /// # Errors
    /// `AccessDenied` for non-doctors, or a storage failure.
    pub fn pending_requests(
        &self,
        session: &Session,
        patient_name_filter: Option<&str>,
    ) -> Result<Vec<AssignmentRequest>> {
        require_role(session, Role::Doctor)?;
        self.store
            .assignment_requests(session.user_id, patient_name_filter)
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;
    use crate::domain::password::legacy_sha256_hex;
    use crate::domain::{NewUser, PasswordDigest, UserStatus};

    struct Fixture {
        manager: AssignmentManager<SqliteStore>,
        store: Arc<SqliteStore>,
        doctor: Session,
        patient: Session,
    }

    fn insert(store: &SqliteStore, username: &str, full_name: &str, role: Role, status: UserStatus) -> Session {
        let user_id = store
            .create_user(&NewUser {
                username: username.into(),
                full_name: full_name.into(),
                role,
                status,
                id_number: format!("ID-{username}"),
                dob: None,
                digest: PasswordDigest::from_stored(legacy_sha256_hex("pw")).expect("parse"),
            })
            .expect("insert");
        Session {
            user_id,
            username: username.into(),
            full_name: full_name.into(),
            role,
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let doctor = insert(&store, "bob", "Bob Jones", Role::Doctor, UserStatus::Active);
        let patient = insert(&store, "alice", "Alice Smith", Role::Patient, UserStatus::Active);
        Fixture {
            manager: AssignmentManager::new(store.clone()),
            store,
            doctor,
            patient,
        }
    }

    #[test]
    fn test_request_approve_flow() {
        let f = fixture();

        let message = f.manager.request(&f.patient, f.doctor.user_id).expect("request");
        assert_eq!(message, "Connection request to Dr. Bob Jones sent successfully!");

        let inbox = f.manager.pending_requests(&f.doctor, None).expect("inbox");
        assert_eq!(inbox.len(), 1);
        let assignment_id = inbox[0].assignment.assignment_id;

        let message = f.manager.approve(&f.doctor, assignment_id).expect("approve");
        assert_eq!(message, "Patient Alice Smith's request approved.");
        // Idempotent.
        assert!(f.manager.approve(&f.doctor, assignment_id).is_ok());

        let patients = f.manager.list_assigned_patients(&f.doctor).expect("patients");
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].username, "alice");
        assert!(f.manager.pending_requests(&f.doctor, None).expect("inbox").is_empty());
    }

    #[test]
    fn test_duplicate_request_rejected_in_any_state() {
        let f = fixture();
        f.manager.request(&f.patient, f.doctor.user_id).expect("request");

        let again = f.manager.request(&f.patient, f.doctor.user_id).expect_err("duplicate");
        assert_eq!(again.to_string(), "You have already sent a request to Dr. Bob Jones!");

        let assignment_id = f.manager.pending_requests(&f.doctor, None).expect("inbox")[0]
            .assignment
            .assignment_id;
        f.manager.approve(&f.doctor, assignment_id).expect("approve");
        assert!(matches!(
            f.manager.request(&f.patient, f.doctor.user_id),
            Err(OncoError::AlreadyRequested { .. })
        ));
    }

    #[test]
    fn test_reject_makes_doctor_available_again() {
        let f = fixture();
        f.manager.request(&f.patient, f.doctor.user_id).expect("request");
        assert!(f.manager.find_available_doctors(&f.patient, None).expect("list").is_empty());

        let assignment_id = f.manager.pending_requests(&f.doctor, None).expect("inbox")[0]
            .assignment
            .assignment_id;
        let message = f.manager.reject(&f.doctor, assignment_id).expect("reject");
        assert_eq!(message, "Patient Alice Smith's request rejected.");

        let available = f.manager.find_available_doctors(&f.patient, Some("bob")).expect("list");
        assert_eq!(available.len(), 1);
        assert!(matches!(
            f.manager.reject(&f.doctor, assignment_id),
            Err(OncoError::NotFound(_))
        ));
    }

    #[test]
    fn test_active_assignment_is_never_demoted() {
        let f = fixture();
        f.manager.request(&f.patient, f.doctor.user_id).expect("request");
        let assignment_id = f.manager.pending_requests(&f.doctor, None).expect("inbox")[0]
            .assignment
            .assignment_id;
        f.manager.approve(&f.doctor, assignment_id).expect("approve");

        assert!(matches!(
            f.manager.reject(&f.doctor, assignment_id),
            Err(OncoError::Validation(_))
        ));
        assert!(f.store.has_active_assignment(f.doctor.user_id, f.patient.user_id).expect("query"));
    }

    #[test]
    fn test_foreign_doctor_cannot_act() {
        let f = fixture();
        let other = insert(&f.store, "carol", "Carol King", Role::Doctor, UserStatus::Active);
        f.manager.request(&f.patient, f.doctor.user_id).expect("request");
        let assignment_id = f.manager.pending_requests(&f.doctor, None).expect("inbox")[0]
            .assignment
            .assignment_id;

        assert!(matches!(
            f.manager.approve(&other, assignment_id),
            Err(OncoError::NotFound(_))
        ));
        assert_eq!(
            f.manager.approve(&other, assignment_id).expect_err("foreign").to_string(),
            "Request not found."
        );
    }

    #[test]
    fn test_request_requires_active_doctor_and_patient_role() {
        let f = fixture();
        let pending = insert(&f.store, "dan", "Dan Brown", Role::Doctor, UserStatus::PendingApproval);

        assert!(matches!(
            f.manager.request(&f.patient, pending.user_id),
            Err(OncoError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.request(&f.patient, f.patient.user_id),
            Err(OncoError::NotFound(_))
        ));
        assert!(matches!(
            f.manager.request(&f.doctor, f.doctor.user_id),
            Err(OncoError::AccessDenied)
        ));

        let available = f.manager.find_available_doctors(&f.patient, None).expect("list");
        assert_eq!(available.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![f.doctor.user_id]);
    }
}
