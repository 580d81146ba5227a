//! End-to-end clinic workflow over an in-memory database.

use std::sync::Arc;

use chrono::NaiveDate;
use zeroize::Zeroizing;

use super::predictions::tests::{input, FixedScorer};
use super::*;
use crate::adapters::sqlite::SqliteStore;
use crate::config::AppConfig;
use crate::domain::{RiskClass, Role, SignUp, UserStatus};
use crate::ports::ClinicStore;
use crate::OncoError;

fn sign_up(first: &str, last: &str, username: &str, password: &str, role: Role, id_number: &str) -> SignUp {
    SignUp {
        first_name: first.into(),
        last_name: last.into(),
        username: username.into(),
        password: Zeroizing::new(password.into()),
        confirm_password: Zeroizing::new(password.into()),
        role,
        id_number: id_number.into(),
        dob: NaiveDate::from_ymd_opt(1980, 3, 1),
    }
}

#[test]
fn test_registration_to_logged_prediction() {
    let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
    let seed = AdminPassword {
        secret: Zeroizing::new("admin123".into()),
        source: PasswordSource::BuiltInDefault,
    };
    ensure_admin(store.as_ref(), &seed).expect("seed admin");

    let config = AppConfig::default();
    let auth = Authenticator::from_config(store.clone(), &config);
    let admin = AdminService::from_config(store.clone(), &config);
    let assignments = AssignmentManager::new(store.clone());
    let recorder = PredictionRecorder::new(store.clone(), Arc::new(FixedScorer(0.65)))
        .with_today(NaiveDate::from_ymd_opt(2025, 6, 1).expect("date"));

    let alice = auth
        .register(&sign_up("Alice", "Smith", "alice", "pw1", Role::Patient, "P-100"))
        .expect("register alice");
    let bob = auth
        .register(&sign_up("Bob", "Jones", "bob", "pw2", Role::Doctor, "D-200"))
        .expect("register bob");
    assert_eq!(bob.status, UserStatus::PendingApproval);
    assert_eq!(
        creation_message(bob.role, bob.status),
        "Sign up request sent successfully and is waiting for Administrator's approval!"
    );
    assert!(matches!(auth.login("bob", "pw2"), Err(OncoError::PendingApproval)));

    let admin_session = auth.login("admin", "admin123").expect("admin login");
    admin
        .approve_doctor(&admin_session, bob.user_id)
        .expect("approve bob");
    let bob_session = auth.login("bob", "pw2").expect("bob login");
    let alice_session = auth.login("alice", "pw1").expect("alice login");

    let outcome = Outcome::from(assignments.request(&alice_session, bob.user_id));
    assert!(outcome.success);
    assert_eq!(outcome.message, "Connection request to Dr. Bob Jones sent successfully!");
    let duplicate = Outcome::from(assignments.request(&alice_session, bob.user_id));
    assert!(!duplicate.success);
    assert_eq!(duplicate.message, "You have already sent a request to Dr. Bob Jones!");
    let request_id = assignments
        .pending_requests(&bob_session, None)
        .expect("inbox")[0]
        .assignment
        .assignment_id;
    assignments.approve(&bob_session, request_id).expect("approve");

    let patients = assignments
        .list_assigned_patients(&bob_session)
        .expect("patients");
    assert_eq!(patients.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![alice.user_id]);

    let prediction = recorder
        .predict_and_log(&bob_session, alice.user_id, input(5.0))
        .expect("prediction");
    assert_eq!(prediction.features.age, 45);
    assert_eq!(prediction.predicted_class, RiskClass::High);
    assert_eq!(
        prediction.predicted_class,
        RiskClass::from_probability(prediction.probability)
    );

    let history = recorder
        .patient_history(&alice_session, Some("bob"))
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].prediction.doctor_id, bob.user_id);
    assert_eq!(history[0].patient_name, "Alice Smith");

    // Deleting the patient removes her assignment and predictions.
    admin
        .delete_user(&admin_session, alice.user_id)
        .expect("delete alice");
    assert!(store.doctor_records(bob.user_id, None).expect("records").is_empty());
    assert!(assignments
        .list_assigned_patients(&bob_session)
        .expect("patients")
        .is_empty());
}
