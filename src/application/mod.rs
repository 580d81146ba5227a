//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application. Every service is generic over the
//! [`ClinicStore`](crate::ports::ClinicStore) port and checks the caller's
//! [`Session`] role before touching storage.

mod admin;
mod assignments;
mod auth;
mod outcome;
mod predictions;
mod setup;

#[cfg(test)]
mod workflow_tests;

pub use admin::{AdminService, UserEdit};
pub use assignments::AssignmentManager;
pub use auth::{creation_message, Authenticator};
pub use outcome::Outcome;
pub use predictions::PredictionRecorder;
pub use setup::{
    admin_password, ensure_admin, AdminPassword, PasswordSource, ADMIN_PASSWORD_FILE_ENV,
    DEFAULT_ADMIN_SECRET_PATH,
};

use crate::adapters::StorageError;
use crate::domain::{Role, Session};
use crate::OncoError;

/// Convert a port error into the application error.
pub(crate) fn store_err<E: Into<StorageError>>(e: E) -> OncoError {
    OncoError::from(e.into())
}

/// Like [`store_err`], but names the missing entity in `NotFound` messages.
pub(crate) fn store_err_for<E: Into<StorageError>>(entity: &'static str) -> impl FnOnce(E) -> OncoError {
    move |e| match e.into() {
        StorageError::NotFound(_) => OncoError::NotFound(entity.into()),
        other => OncoError::from(other),
    }
}

/// Refuse the operation unless the session holds `role`.
pub(crate) fn require_role(session: &Session, role: Role) -> crate::Result<()> {
    if session.role == role {
        Ok(())
    } else {
        tracing::warn!(
            user_id = session.user_id,
            role = session.role.as_str(),
            required = role.as_str(),
            "Operation refused for role"
        );
        Err(OncoError::AccessDenied)
    }
}
