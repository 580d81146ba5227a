//! First-run setup: seed the default administrator.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use zeroize::Zeroizing;

use crate::domain::password::hash_password;
use crate::domain::{NewUser, Role, UserStatus};
use crate::ports::ClinicStore;
use crate::{OncoError, Result};

use super::store_err;

/// Secure sources for the seeded administrator password.
///
/// Precedence (highest first):
/// - `ONCOGUARD_ADMIN_PASSWORD_FILE` (read from a file path)
/// - `/run/secrets/oncoguard_admin_password` (Docker/Compose secret default)
/// - `ONCOGUARD_ADMIN_PASSWORD`, debug builds only
/// - the built-in default, which must be rotated
pub const ADMIN_PASSWORD_FILE_ENV: &str = "ONCOGUARD_ADMIN_PASSWORD_FILE";
pub const DEFAULT_ADMIN_SECRET_PATH: &str = "/run/secrets/oncoguard_admin_password";

// Dev-only escape hatch for local runs and tests.
const ADMIN_PASSWORD_ENV_DEV: &str = "ONCOGUARD_ADMIN_PASSWORD";

const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
const ADMIN_USERNAME: &str = "admin";
const ADMIN_FULL_NAME: &str = "Admin User";
const ADMIN_ID_NUMBER: &str = "ADMIN0000";

/// Where the administrator password was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    File,
    DockerSecret,
    Environment,
    BuiltInDefault,
}

/// The seed password and its provenance.
pub struct AdminPassword {
    pub secret: Zeroizing<String>,
    pub source: PasswordSource,
}

impl std::fmt::Debug for AdminPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminPassword")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn read_secret(path: &Path) -> Result<Zeroizing<String>> {
    let content = Zeroizing::new(fs::read_to_string(path)?);
    let secret = content.trim_end_matches(['\n', '\r']);
    if secret.is_empty() {
        return Err(OncoError::Validation(format!(
            "Administrator password file {} is empty.",
            path.display()
        )));
    }
    Ok(Zeroizing::new(secret.to_string()))
}

/// Resolve the administrator password. `lookup` reads environment
/// variables; `secret_path` is the Docker secret location.
///
/// # Errors
/// Returns an I/O error if a configured file cannot be read, or
/// `Validation` if it is empty.
pub fn admin_password(
    lookup: impl Fn(&str) -> Option<String>,
    secret_path: &Path,
) -> Result<AdminPassword> {
    if let Some(path) = lookup(ADMIN_PASSWORD_FILE_ENV).filter(|p| !p.trim().is_empty()) {
        return Ok(AdminPassword {
            secret: read_secret(Path::new(path.trim()))?,
            source: PasswordSource::File,
        });
    }

    if secret_path.exists() {
        return Ok(AdminPassword {
            secret: read_secret(secret_path)?,
            source: PasswordSource::DockerSecret,
        });
    }

    if cfg!(debug_assertions) {
        if let Some(v) = lookup(ADMIN_PASSWORD_ENV_DEV) {
            let secret = v.trim_end_matches(['\n', '\r']).to_string();
            if !secret.is_empty() {
                return Ok(AdminPassword {
                    secret: Zeroizing::new(secret),
                    source: PasswordSource::Environment,
                });
            }
        }
    }

    Ok(AdminPassword {
        secret: Zeroizing::new(DEFAULT_ADMIN_PASSWORD.to_string()),
        source: PasswordSource::BuiltInDefault,
    })
}

/// Create the default administrator unless an `admin` account exists.
/// Returns whether an account was created.
///
/// # Errors
/// Returns an error if hashing or storage fails.
pub fn ensure_admin<S>(store: &S, password: &AdminPassword) -> Result<bool>
where
    S: ClinicStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    if store
        .find_credentials(ADMIN_USERNAME)
        .map_err(store_err)?
        .is_some()
    {
        tracing::debug!("Administrator account already present");
        return Ok(false);
    }

    let user_id = store
        .create_user(&NewUser {
            username: ADMIN_USERNAME.into(),
            full_name: ADMIN_FULL_NAME.into(),
            role: Role::Admin,
            status: UserStatus::Active,
            id_number: ADMIN_ID_NUMBER.into(),
            dob: NaiveDate::from_ymd_opt(2000, 1, 1),
            digest: hash_password(password.secret.as_str())?,
        })
        .map_err(store_err)?;

    if password.source == PasswordSource::BuiltInDefault {
        tracing::warn!(user_id, "Administrator seeded with the default password; change it after first login");
    } else {
        tracing::info!(user_id, source = ?password.source, "Administrator seeded");
    }
    Ok(true)
}
