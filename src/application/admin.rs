//! Administration service: user management and doctor approvals.

use std::sync::Arc;

use chrono::NaiveDate;
use zeroize::Zeroizing;

use crate::config::{AppConfig, DEFAULT_ITEMS_PER_PAGE};
use crate::domain::password::hash_password;
use crate::domain::{check_identifier_lengths, Role, Session, SignUp, User, UserStatus, UserUpdate};
use crate::ports::{ClinicStore, Page};
use crate::{OncoError, Result};

use super::auth::new_user_from_form;
use super::{require_role, store_err, store_err_for};

/// Administrator edit of an existing user. `None` or blank keeps the
/// current value; a blank new password keeps the current password.
#[derive(Clone, Default)]
pub struct UserEdit {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub id_number: Option<String>,
    pub dob: Option<NaiveDate>,
    pub new_password: Zeroizing<String>,
    pub confirm_password: Zeroizing<String>,
}

impl std::fmt::Debug for UserEdit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEdit")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("password_change", &!self.new_password.is_empty())
            .finish_non_exhaustive()
    }
}

fn require_admin(session: &Session) -> Result<()> {
    require_role(session, Role::Admin)
}

/// Service behind the administrator dashboard.
pub struct AdminService<S>
where
    S: ClinicStore,
{
    store: Arc<S>,
    items_per_page: usize,
}

impl<S> AdminService<S>
where
    S: ClinicStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
        }
    }

    /// Build the service with the configured directory page size.
    pub fn from_config(store: Arc<S>, config: &AppConfig) -> Self {
        Self::new(store).with_page_size(config.items_per_page)
    }

    #[must_use]
    pub fn with_page_size(mut self, items_per_page: usize) -> Self {
        self.items_per_page = items_per_page.max(1);
        self
    }

    /// Create a user with any role and an explicit status.
    ///
    /// # Errors
    /// `AccessDenied`, `Validation` (date of birth is required here), or
    /// `DuplicateKey`.
    pub fn create_user(&self, session: &Session, form: &SignUp, status: UserStatus) -> Result<User> {
        require_admin(session)?;
        let new_user = new_user_from_form(form, status, true)?;

        let user_id = self.store.create_user(&new_user).map_err(store_err)?;
        tracing::info!(
            admin_id = session.user_id,
            user_id,
            role = new_user.role.as_str(),
            "User created by administrator"
        );

        Ok(User {
            user_id,
            username: new_user.username,
            full_name: new_user.full_name,
            role: new_user.role,
            status,
            id_number: new_user.id_number,
            dob: new_user.dob,
        })
    }

    /// Apply a partial edit.
    ///
    /// # Errors
    /// `AccessDenied`; `Validation` for unconfirmed passwords, over-long
    /// identifiers, a future date of birth, or an administrator changing
    /// their own role or status; `NotFound`; `DuplicateKey`.
    pub fn update_user(&self, session: &Session, user_id: i64, edit: UserEdit) -> Result<String> {
        require_admin(session)?;

        if !edit.new_password.is_empty() && edit.new_password.as_str() != edit.confirm_password.as_str() {
            return Err(OncoError::Validation("New passwords do not match.".into()));
        }
        if user_id == session.user_id {
            if edit.role.is_some_and(|role| role != session.role) {
                return Err(OncoError::Validation("You cannot change your own role.".into()));
            }
            if edit.status.is_some_and(|status| status != UserStatus::Active) {
                return Err(OncoError::Validation("You cannot deactivate your own account.".into()));
            }
        }
        check_identifier_lengths(
            edit.username.as_deref().unwrap_or_default(),
            edit.id_number.as_deref().unwrap_or_default(),
        )
        .map_err(OncoError::Validation)?;
        if edit.dob.is_some_and(|dob| dob > chrono::Local::now().date_naive()) {
            return Err(OncoError::Validation("Date of birth cannot be in the future.".into()));
        }

        let digest = if edit.new_password.is_empty() {
            None
        } else {
            Some(hash_password(edit.new_password.as_str())?)
        };
        let update = UserUpdate {
            username: edit.username,
            full_name: edit.full_name,
            role: edit.role,
            status: edit.status,
            id_number: edit.id_number,
            dob: edit.dob,
            digest,
        }
        .normalized();
        if update.is_empty() {
            return Ok("No changes to save.".into());
        }

        self.store
            .update_user(user_id, &update)
            .map_err(store_err_for("User"))?;
        tracing::info!(admin_id = session.user_id, user_id, "User updated by administrator");
        Ok("User information updated successfully.".into())
    }

    /// Delete a user and, by cascade, their assignments and predictions.
    ///
    /// # Errors
    /// `AccessDenied`, `Validation` for self-deletion, or `NotFound`.
    pub fn delete_user(&self, session: &Session, user_id: i64) -> Result<String> {
        require_admin(session)?;
        if user_id == session.user_id {
            return Err(OncoError::Validation("You cannot delete your own account.".into()));
        }

        let deleted = self
            .store
            .delete_user(user_id)
            .map_err(store_err_for("User"))?;
        tracing::info!(admin_id = session.user_id, user_id, "User deleted");
        Ok(format!("User {} deleted successfully.", deleted.full_name))
    }

    /// All users ordered by id, optionally narrowed by username.
    ///
    /// # Errors
    /// `AccessDenied` or a storage failure.
    pub fn list_users(&self, session: &Session, username_filter: Option<&str>) -> Result<Vec<User>> {
        require_admin(session)?;
        self.store.list_users(username_filter).map_err(store_err)
    }

    /// One page (0-based) of the user directory.
    ///
    /// # Errors
    /// `AccessDenied`, `Validation` for a page number past the addressable
    /// range, or a storage failure.
    pub fn user_directory(
        &self,
        session: &Session,
        username_filter: Option<&str>,
        page: usize,
    ) -> Result<Page<User>> {
        require_admin(session)?;
        let offset = page
            .checked_mul(self.items_per_page)
            .ok_or_else(|| OncoError::Validation("Page number is out of range.".into()))?;
        self.store
            .list_users_paginated(username_filter, offset, self.items_per_page)
            .map_err(store_err)
    }

    /// # Errors
    /// `AccessDenied` or a storage failure.
    pub fn pending_doctors(&self, session: &Session) -> Result<Vec<User>> {
        require_admin(session)?;
        self.store.pending_doctors().map_err(store_err)
    }

    /// Activate a pending doctor.
    ///
    /// # Errors
    /// `AccessDenied`, or `NotFound` unless the id is a pending doctor.
    pub fn approve_doctor(&self, session: &Session, doctor_id: i64) -> Result<String> {
        require_admin(session)?;
        let doctor = self
            .store
            .approve_doctor(doctor_id)
            .map_err(store_err_for("Doctor"))?;
        tracing::info!(admin_id = session.user_id, doctor_id, "Doctor approved");
        Ok(format!("Dr. {} has been approved.", doctor.full_name))
    }

    /// Delete a pending doctor's registration.
    ///
    /// # Errors
    /// `AccessDenied`, or `NotFound` unless the id is a pending doctor.
    pub fn reject_doctor(&self, session: &Session, doctor_id: i64) -> Result<String> {
        require_admin(session)?;
        let doctor = self
            .store
            .reject_doctor(doctor_id)
            .map_err(store_err_for("Doctor"))?;
        tracing::info!(admin_id = session.user_id, doctor_id, "Doctor registration rejected");
        Ok(format!("Registration for Dr. {} has been rejected.", doctor.full_name))
    }
}
