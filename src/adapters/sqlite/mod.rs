//! SQLite adapter: Implementation of `ClinicStore`.
//!
//! Provides local persistence for users, doctor-patient assignments and
//! predictions.
//!
//! # Integrity
//!
//! - `PRAGMA foreign_keys = ON` with `ON DELETE CASCADE` on every reference
//! - `UNIQUE` constraints on username, id number and each (doctor, patient)
//!   pair; violations surface as `StorageError::UniqueViolation`
//! - Multi-statement operations run inside a single transaction
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex is reported as
//! `StorageError::LockPoisoned` instead of panicking.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{
    params, types::Type, Connection, OptionalExtension, Row, TransactionBehavior,
};

use crate::domain::{
    Assignment, AssignmentRequest, AssignmentStatus, CancerStage, ClinicalFeatures, Comorbidities,
    Metastasis, NewPrediction, NewUser, PasswordDigest, Prediction, PredictionRecord, RiskClass,
    Role, TreatmentType, TumorType, User, UserCredentials, UserStatus, UserUpdate,
};
use crate::ports::{ClinicStore, Page};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Uniqueness constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stored row is invalid: {0}")]
    Corrupt(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &e {
            let code = failure.extended_code;
            if code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return Self::UniqueViolation(
                    message.clone().unwrap_or_else(|| "duplicate key".to_string()),
                );
            }
        }
        Self::Database(e)
    }
}

// Every user query aliases `users` as `u`.
const USER_COLUMNS: &str = "u.user_id, u.username, u.full_name, u.role, u.status, u.id_number, u.dob";

// Every prediction query aliases `predictions` as `p`, the doctor as `d` and
// the patient as `pt`.
const PREDICTION_COLUMNS: &str = "p.prediction_id, p.doctor_id, p.patient_id, \
     p.prediction_timestamp, p.age, p.cancer_stage, p.tumor_size, p.tumor_type, \
     p.metastasis, p.treatment_type, p.comorbidities, p.predicted_class, \
     p.prediction_probability";

/// SQLite storage adapter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Initialize the database schema. Idempotent.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('admin', 'doctor', 'patient')),
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'pending_approval')),
                id_number TEXT NOT NULL UNIQUE,
                dob DATE
            );

            CREATE TABLE IF NOT EXISTS doctor_patient_assignments (
                assignment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                doctor_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                patient_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'requested'
                    CHECK (status IN ('requested', 'active')),
                UNIQUE (doctor_id, patient_id),
                CHECK (doctor_id <> patient_id)
            );

            CREATE TABLE IF NOT EXISTS predictions (
                prediction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                doctor_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                patient_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                prediction_timestamp TEXT NOT NULL
                    DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                age INTEGER NOT NULL,
                cancer_stage TEXT NOT NULL,
                tumor_size REAL NOT NULL,
                tumor_type TEXT NOT NULL,
                metastasis TEXT NOT NULL,
                treatment_type TEXT NOT NULL,
                comorbidities TEXT NOT NULL,
                predicted_class TEXT NOT NULL
                    CHECK (predicted_class IN ('Low Risk', 'Medium Risk', 'High Risk')),
                prediction_probability REAL NOT NULL
                    CHECK (prediction_probability >= 0.0 AND prediction_probability <= 1.0)
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_doctor
                ON doctor_patient_assignments(doctor_id, status);
            CREATE INDEX IF NOT EXISTS idx_assignments_patient
                ON doctor_patient_assignments(patient_id);
            CREATE INDEX IF NOT EXISTS idx_predictions_patient
                ON predictions(patient_id, prediction_timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_predictions_doctor
                ON predictions(doctor_id, prediction_timestamp DESC);
            ",
        )?;

        Ok(())
    }
}

/// Turn a free-text search into a `LIKE` pattern with literal wildcards.
/// Blank input means "no filter".
fn like_pattern(filter: Option<&str>) -> Option<String> {
    let needle = filter.map(str::trim).filter(|f| !f.is_empty())?;
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

fn invalid_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unexpected value {value:?}").into(),
    )
}

fn text_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| invalid_column(idx, &raw))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        role: text_column(row, 3, Role::parse)?,
        status: text_column(row, 4, UserStatus::parse)?,
        id_number: row.get(5)?,
        dob: row.get(6)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        assignment_id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        status: text_column(row, 3, AssignmentStatus::parse)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_column(idx, &raw))
}

fn prediction_from_row(row: &Row<'_>) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        prediction_id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        timestamp: timestamp_column(row, 3)?,
        features: ClinicalFeatures {
            age: row.get(4)?,
            cancer_stage: text_column(row, 5, CancerStage::parse)?,
            tumor_size: row.get(6)?,
            tumor_type: text_column(row, 7, TumorType::parse)?,
            metastasis: text_column(row, 8, Metastasis::parse)?,
            treatment_type: text_column(row, 9, TreatmentType::parse)?,
            comorbidities: text_column(row, 10, Comorbidities::parse)?,
        },
        predicted_class: text_column(row, 11, RiskClass::parse)?,
        probability: row.get(12)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PredictionRecord> {
    Ok(PredictionRecord {
        prediction: prediction_from_row(row)?,
        doctor_name: row.get(13)?,
        patient_name: row.get(14)?,
    })
}

fn fetch_user(conn: &Connection, user_id: i64) -> Result<Option<User>, StorageError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.user_id = ?1"),
            params![user_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn fetch_assignment(conn: &Connection, assignment_id: i64) -> Result<Option<Assignment>, StorageError> {
    let assignment = conn
        .query_row(
            "SELECT assignment_id, doctor_id, patient_id, status
             FROM doctor_patient_assignments WHERE assignment_id = ?1",
            params![assignment_id],
            assignment_from_row,
        )
        .optional()?;
    Ok(assignment)
}

fn fetch_prediction(conn: &Connection, prediction_id: i64) -> Result<Option<PredictionRecord>, StorageError> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {PREDICTION_COLUMNS}, d.full_name, pt.full_name
                 FROM predictions p
                 JOIN users d ON d.user_id = p.doctor_id
                 JOIN users pt ON pt.user_id = p.patient_id
                 WHERE p.prediction_id = ?1"
            ),
            params![prediction_id],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

fn fetch_pending_doctor(conn: &Connection, user_id: i64) -> Result<User, StorageError> {
    conn.query_row(
        &format!(
            "SELECT {USER_COLUMNS} FROM users u
             WHERE u.user_id = ?1 AND u.role = 'doctor' AND u.status = 'pending_approval'"
        ),
        params![user_id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("pending doctor {user_id}")))
}

impl ClinicStore for SqliteStore {
    type Error = StorageError;

    fn create_user(&self, user: &NewUser) -> Result<i64, Self::Error> {
        let conn = self.lock()?;

        conn.execute(
            r"
            INSERT INTO users (username, password_hash, full_name, role, status, id_number, dob)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                user.username,
                user.digest.as_str(),
                user.full_name,
                user.role.as_str(),
                user.status.as_str(),
                user.id_number,
                user.dob,
            ],
        )?;

        let user_id = conn.last_insert_rowid();
        tracing::debug!(user_id, role = user.role.as_str(), "Inserted user");
        Ok(user_id)
    }

    fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<User, Self::Error> {
        let update = update.clone().normalized();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = fetch_user(&tx, user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        let merged = update.merge(&current);

        tx.execute(
            r"
            UPDATE users
            SET username = ?1, full_name = ?2, role = ?3, status = ?4, id_number = ?5, dob = ?6
            WHERE user_id = ?7
            ",
            params![
                merged.username,
                merged.full_name,
                merged.role.as_str(),
                merged.status.as_str(),
                merged.id_number,
                merged.dob,
                user_id,
            ],
        )?;
        if let Some(digest) = &update.digest {
            tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE user_id = ?2",
                params![digest.as_str(), user_id],
            )?;
        }

        tx.commit()?;
        tracing::debug!(user_id, "Updated user");
        Ok(merged)
    }

    fn delete_user(&self, user_id: i64) -> Result<User, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let user = fetch_user(&tx, user_id)?
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        tx.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;

        tx.commit()?;
        tracing::debug!(user_id, "Deleted user and dependent rows");
        Ok(user)
    }

    fn find_user(&self, user_id: i64) -> Result<Option<User>, Self::Error> {
        let conn = self.lock()?;
        fetch_user(&conn, user_id)
    }

    fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>, Self::Error> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.username = ?1"),
                params![username],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(7)?)),
            )
            .optional()?;

        match row {
            Some((user, stored)) => {
                let digest = PasswordDigest::from_stored(stored)
                    .map_err(|e| StorageError::Corrupt(format!("user {}: {e}", user.user_id)))?;
                Ok(Some(UserCredentials { user, digest }))
            }
            None => Ok(None),
        }
    }

    fn list_users(&self, username_filter: Option<&str>) -> Result<Vec<User>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {USER_COLUMNS} FROM users u
            WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\')
            ORDER BY u.user_id
            "
        ))?;
        let users = stmt
            .query_map(params![like_pattern(username_filter)], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn list_users_paginated(
        &self,
        username_filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<User>, Self::Error> {
        let conn = self.lock()?;
        let pattern = like_pattern(username_filter);

        let total_count: i64 = conn.query_row(
            r"SELECT COUNT(*) FROM users u WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\')",
            params![pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {USER_COLUMNS} FROM users u
            WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\')
            ORDER BY u.user_id
            LIMIT ?2 OFFSET ?3
            "
        ))?;
        let users = stmt
            .query_map(
                params![
                    pattern,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(offset).unwrap_or(i64::MAX)
                ],
                user_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(users, total_count as usize, offset, limit))
    }

    fn pending_doctors(&self) -> Result<Vec<User>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users u
             WHERE u.role = 'doctor' AND u.status = 'pending_approval'
             ORDER BY u.user_id"
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn approve_doctor(&self, user_id: i64) -> Result<User, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut doctor = fetch_pending_doctor(&tx, user_id)?;
        tx.execute(
            "UPDATE users SET status = 'active' WHERE user_id = ?1",
            params![user_id],
        )?;
        doctor.status = UserStatus::Active;

        tx.commit()?;
        tracing::debug!(user_id, "Activated doctor");
        Ok(doctor)
    }

    fn reject_doctor(&self, user_id: i64) -> Result<User, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let doctor = fetch_pending_doctor(&tx, user_id)?;
        tx.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;

        tx.commit()?;
        tracing::debug!(user_id, "Deleted pending doctor");
        Ok(doctor)
    }

    fn set_password(&self, user_id: i64, digest: &PasswordDigest) -> Result<(), Self::Error> {
        let conn = self.lock()?;

        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE user_id = ?2",
            params![digest.as_str(), user_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("user {user_id}")));
        }

        tracing::debug!(user_id, "Replaced password digest");
        Ok(())
    }

    fn create_assignment_request(
        &self,
        doctor_id: i64,
        patient_id: i64,
    ) -> Result<Assignment, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM doctor_patient_assignments WHERE doctor_id = ?1 AND patient_id = ?2",
            params![doctor_id, patient_id],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StorageError::UniqueViolation(format!(
                "assignment for doctor {doctor_id} and patient {patient_id}"
            )));
        }

        tx.execute(
            "INSERT INTO doctor_patient_assignments (doctor_id, patient_id, status)
             VALUES (?1, ?2, 'requested')",
            params![doctor_id, patient_id],
        )?;
        let assignment_id = tx.last_insert_rowid();

        tx.commit()?;
        tracing::debug!(assignment_id, doctor_id, patient_id, "Inserted assignment request");
        Ok(Assignment {
            assignment_id,
            doctor_id,
            patient_id,
            status: AssignmentStatus::Requested,
        })
    }

    fn find_assignment(&self, assignment_id: i64) -> Result<Option<Assignment>, Self::Error> {
        let conn = self.lock()?;
        fetch_assignment(&conn, assignment_id)
    }

    fn activate_assignment(&self, assignment_id: i64) -> Result<Assignment, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE doctor_patient_assignments SET status = 'active' WHERE assignment_id = ?1",
            params![assignment_id],
        )?;
        let assignment = fetch_assignment(&tx, assignment_id)?
            .ok_or_else(|| StorageError::NotFound(format!("assignment {assignment_id}")))?;

        tx.commit()?;
        tracing::debug!(assignment_id, "Activated assignment");
        Ok(assignment)
    }

    fn delete_assignment_request(&self, assignment_id: i64) -> Result<(), Self::Error> {
        let conn = self.lock()?;

        let changed = conn.execute(
            "DELETE FROM doctor_patient_assignments WHERE assignment_id = ?1 AND status = 'requested'",
            params![assignment_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("assignment request {assignment_id}")));
        }

        tracing::debug!(assignment_id, "Deleted assignment request");
        Ok(())
    }

    fn assignment_requests(
        &self,
        doctor_id: i64,
        patient_name_filter: Option<&str>,
    ) -> Result<Vec<AssignmentRequest>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT a.assignment_id, a.doctor_id, a.patient_id, a.status, u.username, u.full_name
            FROM doctor_patient_assignments a
            JOIN users u ON u.user_id = a.patient_id
            WHERE a.doctor_id = ?1 AND a.status = 'requested'
              AND (?2 IS NULL OR u.full_name LIKE ?2 ESCAPE '\')
            ORDER BY a.assignment_id
            ",
        )?;
        let requests = stmt
            .query_map(params![doctor_id, like_pattern(patient_name_filter)], |row| {
                Ok(AssignmentRequest {
                    assignment: assignment_from_row(row)?,
                    patient_username: row.get(4)?,
                    patient_name: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(requests)
    }

    fn assigned_patients(&self, doctor_id: i64) -> Result<Vec<User>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users u
             JOIN doctor_patient_assignments a ON a.patient_id = u.user_id
             WHERE a.doctor_id = ?1 AND a.status = 'active' AND u.role = 'patient'
             ORDER BY u.user_id"
        ))?;
        let patients = stmt
            .query_map(params![doctor_id], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(patients)
    }

    fn available_doctors(
        &self,
        patient_id: i64,
        name_filter: Option<&str>,
    ) -> Result<Vec<User>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {USER_COLUMNS} FROM users u
            WHERE u.role = 'doctor' AND u.status = 'active'
              AND NOT EXISTS (
                  SELECT 1 FROM doctor_patient_assignments a
                  WHERE a.doctor_id = u.user_id AND a.patient_id = ?1
              )
              AND (?2 IS NULL OR u.full_name LIKE ?2 ESCAPE '\')
            ORDER BY u.user_id
            "
        ))?;
        let doctors = stmt
            .query_map(params![patient_id, like_pattern(name_filter)], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(doctors)
    }

    fn has_active_assignment(&self, doctor_id: i64, patient_id: i64) -> Result<bool, Self::Error> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM doctor_patient_assignments
             WHERE doctor_id = ?1 AND patient_id = ?2 AND status = 'active'",
            params![doctor_id, patient_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn insert_prediction(&self, prediction: &NewPrediction) -> Result<Prediction, Self::Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let features = &prediction.features;

        tx.execute(
            r"
            INSERT INTO predictions (
                doctor_id, patient_id, age, cancer_stage, tumor_size, tumor_type,
                metastasis, treatment_type, comorbidities, predicted_class,
                prediction_probability
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                prediction.doctor_id,
                prediction.patient_id,
                features.age,
                features.cancer_stage.as_str(),
                features.tumor_size,
                features.tumor_type.as_str(),
                features.metastasis.as_str(),
                features.treatment_type.as_str(),
                features.comorbidities.as_str(),
                prediction.predicted_class.as_str(),
                prediction.probability,
            ],
        )?;
        let prediction_id = tx.last_insert_rowid();

        let stored = fetch_prediction(&tx, prediction_id)?
            .ok_or_else(|| StorageError::NotFound(format!("prediction {prediction_id}")))?
            .prediction;

        tx.commit()?;
        tracing::debug!(prediction_id, "Inserted prediction");
        Ok(stored)
    }

    fn find_prediction(&self, prediction_id: i64) -> Result<Option<PredictionRecord>, Self::Error> {
        let conn = self.lock()?;
        fetch_prediction(&conn, prediction_id)
    }

    fn patient_history(
        &self,
        patient_id: i64,
        doctor_name_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {PREDICTION_COLUMNS}, d.full_name, pt.full_name
            FROM predictions p
            JOIN users d ON d.user_id = p.doctor_id
            JOIN users pt ON pt.user_id = p.patient_id
            WHERE p.patient_id = ?1
              AND (?2 IS NULL OR d.full_name LIKE ?2 ESCAPE '\')
            ORDER BY p.prediction_timestamp DESC, p.prediction_id DESC
            "
        ))?;
        let records = stmt
            .query_map(params![patient_id, like_pattern(doctor_name_filter)], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn doctor_records(
        &self,
        doctor_id: i64,
        patient_name_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>, Self::Error> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {PREDICTION_COLUMNS}, d.full_name, pt.full_name
            FROM predictions p
            JOIN users d ON d.user_id = p.doctor_id
            JOIN users pt ON pt.user_id = p.patient_id
            WHERE p.doctor_id = ?1
              AND (?2 IS NULL OR pt.full_name LIKE ?2 ESCAPE '\')
            ORDER BY p.prediction_timestamp DESC, p.prediction_id DESC
            "
        ))?;
        let records = stmt
            .query_map(params![doctor_id, like_pattern(patient_name_filter)], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::password::legacy_sha256_hex;
    use chrono::NaiveDate;

    fn new_user(username: &str, full_name: &str, role: Role, id_number: &str) -> NewUser {
        NewUser {
            username: username.into(),
            full_name: full_name.into(),
            role,
            status: UserStatus::Active,
            id_number: id_number.into(),
            dob: NaiveDate::from_ymd_opt(1980, 6, 15),
            digest: PasswordDigest::from_stored(legacy_sha256_hex("pw")).expect("Should parse"),
        }
    }

    fn features() -> ClinicalFeatures {
        ClinicalFeatures {
            age: 45,
            cancer_stage: CancerStage::II,
            tumor_size: 5.0,
            tumor_type: TumorType::Breast,
            metastasis: Metastasis::No,
            treatment_type: TreatmentType::Surgery,
            comorbidities: Comorbidities::None,
        }
    }

    fn seeded() -> (SqliteStore, i64, i64) {
        let store = SqliteStore::in_memory().expect("Should create db");
        let doctor = store
            .create_user(&new_user("bob", "Bob Jones", Role::Doctor, "D-1"))
            .expect("Should insert doctor");
        let patient = store
            .create_user(&new_user("alice", "Alice Smith", Role::Patient, "P-1"))
            .expect("Should insert patient");
        (store, doctor, patient)
    }

    #[test]
    fn test_duplicate_username_and_id_number() {
        let (store, _, patient) = seeded();

        let same_name = store.create_user(&new_user("alice", "Other", Role::Patient, "P-2"));
        assert!(matches!(same_name, Err(StorageError::UniqueViolation(_))));

        let same_id = store.create_user(&new_user("carol", "Carol", Role::Patient, "P-1"));
        assert!(matches!(same_id, Err(StorageError::UniqueViolation(_))));

        let first = store.find_user(patient).expect("Should query").expect("Should exist");
        assert_eq!(first.full_name, "Alice Smith");
    }

    #[test]
    fn test_credentials_lookup() {
        let (store, _, _) = seeded();

        let creds = store
            .find_credentials("alice")
            .expect("Should query")
            .expect("Should exist");
        assert_eq!(creds.user.username, "alice");
        assert!(creds.digest.needs_upgrade());
        assert!(store.find_credentials("nobody").expect("Should query").is_none());
    }

    #[test]
    fn test_update_merges_and_detects_collision() {
        let (store, doctor, patient) = seeded();

        let update = UserUpdate {
            full_name: Some("Alice Jones".into()),
            id_number: Some(String::new()),
            ..Default::default()
        };
        let updated = store.update_user(patient, &update).expect("Should update");
        assert_eq!(updated.full_name, "Alice Jones");
        assert_eq!(updated.id_number, "P-1");

        let clash = UserUpdate {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_user(doctor, &clash),
            Err(StorageError::UniqueViolation(_))
        ));
        assert!(matches!(
            store.update_user(999, &update),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_cascades() {
        let (store, doctor, patient) = seeded();

        let request = store
            .create_assignment_request(doctor, patient)
            .expect("Should request");
        store
            .activate_assignment(request.assignment_id)
            .expect("Should activate");
        store
            .insert_prediction(&NewPrediction::new(doctor, patient, features(), 0.7))
            .expect("Should insert prediction");

        let deleted = store.delete_user(patient).expect("Should delete");
        assert_eq!(deleted.username, "alice");

        assert!(store
            .find_assignment(request.assignment_id)
            .expect("Should query")
            .is_none());
        assert!(store.doctor_records(doctor, None).expect("Should query").is_empty());
        assert!(matches!(store.delete_user(patient), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_assignment_pair_is_unique() {
        let (store, doctor, patient) = seeded();

        let first = store
            .create_assignment_request(doctor, patient)
            .expect("Should request");
        assert_eq!(first.status, AssignmentStatus::Requested);
        assert!(matches!(
            store.create_assignment_request(doctor, patient),
            Err(StorageError::UniqueViolation(_))
        ));

        store.activate_assignment(first.assignment_id).expect("Should activate");
        assert!(matches!(
            store.create_assignment_request(doctor, patient),
            Err(StorageError::UniqueViolation(_))
        ));
        // Active rows are not deletable as requests.
        assert!(matches!(
            store.delete_assignment_request(first.assignment_id),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_available_doctors_and_requests() {
        let (store, doctor, patient) = seeded();
        let other = store
            .create_user(&new_user("dana", "Dana White", Role::Doctor, "D-2"))
            .expect("Should insert doctor");

        let available = store.available_doctors(patient, None).expect("Should query");
        assert_eq!(available.len(), 2);

        let request = store
            .create_assignment_request(doctor, patient)
            .expect("Should request");
        let available = store.available_doctors(patient, None).expect("Should query");
        assert_eq!(available.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![other]);

        let inbox = store.assignment_requests(doctor, Some("smith")).expect("Should query");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].patient_username, "alice");
        assert!(store
            .assignment_requests(doctor, Some("zzz"))
            .expect("Should query")
            .is_empty());

        store
            .delete_assignment_request(request.assignment_id)
            .expect("Should reject");
        assert_eq!(store.available_doctors(patient, None).expect("Should query").len(), 2);
        assert!(store.assigned_patients(doctor).expect("Should query").is_empty());
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let store = SqliteStore::in_memory().expect("Should create db");
        store
            .create_user(&new_user("a_b", "Under Score", Role::Patient, "X-1"))
            .expect("Should insert");
        store
            .create_user(&new_user("axb", "Plain", Role::Patient, "X-2"))
            .expect("Should insert");
        store
            .create_user(&new_user("ratio", "Percent", Role::Patient, "X-3"))
            .expect("Should insert");

        let underscore = store.list_users(Some("a_b")).expect("Should query");
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].username, "a_b");

        assert!(store.list_users(Some("%")).expect("Should query").is_empty());
        assert_eq!(store.list_users(Some("  ")).expect("Should query").len(), 3);
        assert_eq!(store.list_users(Some("AXB")).expect("Should query").len(), 1);
    }

    #[test]
    fn test_pending_doctor_approval_and_rejection() {
        let store = SqliteStore::in_memory().expect("Should create db");
        let mut pending = new_user("bob", "Bob Jones", Role::Doctor, "D-1");
        pending.status = UserStatus::PendingApproval;
        let bob = store.create_user(&pending).expect("Should insert");
        let mut pending = new_user("eve", "Eve Adams", Role::Doctor, "D-2");
        pending.status = UserStatus::PendingApproval;
        let eve = store.create_user(&pending).expect("Should insert");

        assert_eq!(store.pending_doctors().expect("Should query").len(), 2);

        let approved = store.approve_doctor(bob).expect("Should approve");
        assert!(approved.is_active());
        assert!(matches!(store.approve_doctor(bob), Err(StorageError::NotFound(_))));

        store.reject_doctor(eve).expect("Should reject");
        assert!(store.find_user(eve).expect("Should query").is_none());
        assert!(store.pending_doctors().expect("Should query").is_empty());
    }

    #[test]
    fn test_prediction_history_order_and_names() {
        let (store, doctor, patient) = seeded();

        let first = store
            .insert_prediction(&NewPrediction::new(doctor, patient, features(), 0.2))
            .expect("Should insert");
        let second = store
            .insert_prediction(&NewPrediction::new(doctor, patient, features(), 0.65))
            .expect("Should insert");
        assert_eq!(second.predicted_class, RiskClass::High);
        assert_eq!(second.features.age, 45);

        let history = store.patient_history(patient, None).expect("Should query");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prediction.prediction_id, second.prediction_id);
        assert_eq!(history[1].prediction.prediction_id, first.prediction_id);
        assert_eq!(history[0].doctor_name, "Bob Jones");
        assert_eq!(history[0].patient_name, "Alice Smith");

        assert!(store
            .patient_history(patient, Some("nobody"))
            .expect("Should query")
            .is_empty());
        assert_eq!(
            store.doctor_records(doctor, Some("alice")).expect("Should query").len(),
            2
        );
    }

    #[test]
    fn test_paginated_users() {
        let store = SqliteStore::in_memory().expect("Should create db");
        for i in 0..5 {
            store
                .create_user(&new_user(&format!("user{i}"), "Name", Role::Patient, &format!("ID{i}")))
                .expect("Should insert");
        }

        let page = store.list_users_paginated(None, 0, 2).expect("Should query");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 5);
        assert!(page.has_more);

        let last = store.list_users_paginated(None, 4, 2).expect("Should query");
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);

        let beyond = store
            .list_users_paginated(None, usize::MAX, usize::MAX)
            .expect("Should query");
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 5);
        assert!(!beyond.has_more);
    }

    #[test]
    fn test_like_pattern_escaping() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some(" ")), None);
        assert_eq!(like_pattern(Some("a%b_c\\")), Some("%a\\%b\\_c\\\\%".to_string()));
    }
}
