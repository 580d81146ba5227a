//! Storage port: Trait for the clinic's persistent store.
//!
//! This trait abstracts the storage backend (SQLite) from the application
//! logic. Every call is blocking and committed before it returns.

use crate::domain::{
    Assignment, AssignmentRequest, NewPrediction, NewUser, PasswordDigest, Prediction,
    PredictionRecord, User, UserCredentials, UserUpdate,
};

/// A page of rows with pagination metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Rows in this page
    pub items: Vec<T>,
    /// Total count of matching rows (for UI pagination)
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset.saturating_add(items.len()) < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Get the next page offset.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more {
            Some(self.offset.saturating_add(self.limit))
        } else {
            None
        }
    }

    /// Get the previous page offset.
    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        if self.offset > 0 {
            Some(self.offset.saturating_sub(self.limit))
        } else {
            None
        }
    }

    /// Total number of pages, at least one.
    #[must_use]
    pub fn page_count(&self) -> usize {
        if self.limit == 0 {
            return 1;
        }
        self.total_count.div_ceil(self.limit).max(1)
    }
}

/// Trait for the users / assignments / predictions store.
///
/// Search filters are case-insensitive substrings matched literally;
/// `None` or a blank filter matches everything.
pub trait ClinicStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    // -- users ---------------------------------------------------------------

    /// Insert a user and return its id.
    ///
    /// # Errors
    /// Fails with a uniqueness violation when the username or id number is
    /// already taken.
    fn create_user(&self, user: &NewUser) -> Result<i64, Self::Error>;

    /// Merge `update` over the stored user in one transaction.
    ///
    /// # Errors
    /// Not-found if the user is absent; uniqueness violation on collision.
    fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<User, Self::Error>;

    /// Delete a user, cascading to their assignments and predictions.
    /// Returns the deleted row.
    ///
    /// # Errors
    /// Not-found if the user is absent.
    fn delete_user(&self, user_id: i64) -> Result<User, Self::Error>;

    fn find_user(&self, user_id: i64) -> Result<Option<User>, Self::Error>;

    /// Look up a user with their stored digest, for authentication.
    fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>, Self::Error>;

    /// All users ordered by id, optionally narrowed by username.
    fn list_users(&self, username_filter: Option<&str>) -> Result<Vec<User>, Self::Error>;

    /// Paginated variant of [`ClinicStore::list_users`].
    fn list_users_paginated(
        &self,
        username_filter: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<User>, Self::Error>;

    /// Doctors awaiting administrator approval, ordered by id.
    fn pending_doctors(&self) -> Result<Vec<User>, Self::Error>;

    /// Activate a pending doctor.
    ///
    /// # Errors
    /// Not-found unless the id is a doctor in pending approval.
    fn approve_doctor(&self, user_id: i64) -> Result<User, Self::Error>;

    /// Delete a pending doctor's registration.
    ///
    /// # Errors
    /// Not-found unless the id is a doctor in pending approval.
    fn reject_doctor(&self, user_id: i64) -> Result<User, Self::Error>;

    /// Replace a user's password digest.
    ///
    /// # Errors
    /// Not-found if the user is absent.
    fn set_password(&self, user_id: i64, digest: &PasswordDigest) -> Result<(), Self::Error>;

    // -- assignments ---------------------------------------------------------

    /// Insert a `requested` row for the pair.
    ///
    /// The existence check and insert run in one immediate transaction.
    ///
    /// # Errors
    /// Fails with a uniqueness violation if any row exists for the pair.
    fn create_assignment_request(
        &self,
        doctor_id: i64,
        patient_id: i64,
    ) -> Result<Assignment, Self::Error>;

    fn find_assignment(&self, assignment_id: i64) -> Result<Option<Assignment>, Self::Error>;

    /// Mark an assignment active. Already active rows are left unchanged.
    ///
    /// # Errors
    /// Not-found if the assignment is absent.
    fn activate_assignment(&self, assignment_id: i64) -> Result<Assignment, Self::Error>;

    /// Delete a `requested` assignment.
    ///
    /// # Errors
    /// Not-found if no requested row with this id exists.
    fn delete_assignment_request(&self, assignment_id: i64) -> Result<(), Self::Error>;

    /// Requested rows for a doctor with the patient's names.
    fn assignment_requests(
        &self,
        doctor_id: i64,
        patient_name_filter: Option<&str>,
    ) -> Result<Vec<AssignmentRequest>, Self::Error>;

    /// Patients with an active assignment to this doctor.
    fn assigned_patients(&self, doctor_id: i64) -> Result<Vec<User>, Self::Error>;

    /// Active doctors with no assignment row of any status for this patient.
    fn available_doctors(
        &self,
        patient_id: i64,
        name_filter: Option<&str>,
    ) -> Result<Vec<User>, Self::Error>;

    fn has_active_assignment(&self, doctor_id: i64, patient_id: i64) -> Result<bool, Self::Error>;

    // -- predictions ---------------------------------------------------------

    /// Insert a prediction and return it with its store-assigned timestamp.
    fn insert_prediction(&self, prediction: &NewPrediction) -> Result<Prediction, Self::Error>;

    fn find_prediction(&self, prediction_id: i64) -> Result<Option<PredictionRecord>, Self::Error>;

    /// A patient's predictions, newest first, optionally narrowed by the
    /// doctor's display name.
    fn patient_history(
        &self,
        patient_id: i64,
        doctor_name_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>, Self::Error>;

    /// A doctor's predictions, newest first, optionally narrowed by the
    /// patient's display name.
    fn doctor_records(
        &self,
        doctor_id: i64,
        patient_name_filter: Option<&str>,
    ) -> Result<Vec<PredictionRecord>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offsets() {
        let page = Page::new(vec![1, 2, 3], 7, 3, 3);
        assert!(page.has_more);
        assert_eq!(page.next_offset(), Some(6));
        assert_eq!(page.prev_offset(), Some(0));
        assert_eq!(page.page_count(), 3);

        let last = Page::new(vec![7], 7, 6, 3);
        assert!(!last.has_more);
        assert_eq!(last.next_offset(), None);

        let empty: Page<u8> = Page::new(Vec::new(), 0, 0, 10);
        assert_eq!(empty.page_count(), 1);
        assert_eq!(empty.prev_offset(), None);
    }

    #[test]
    fn test_page_offsets_saturate() {
        let page = Page::new(vec![1, 2], usize::MAX, usize::MAX - 1, 10);
        assert!(!page.has_more);
        assert_eq!(page.next_offset(), None);

        let near_end = Page::new(vec![1], usize::MAX, usize::MAX - 5, 10);
        assert!(near_end.has_more);
        assert_eq!(near_end.next_offset(), Some(usize::MAX));
    }
}
