//! Authentication service: sign-up, login, logout, password change.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::password::{hash_password, verify_against_dummy, verify_password};
use crate::domain::{NewUser, Role, Session, SignUp, User, UserStatus};
use crate::ports::ClinicStore;
use crate::{OncoError, Result};

use super::store_err;

/// Message shown after a user row is created.
#[must_use]
pub fn creation_message(role: Role, status: UserStatus) -> &'static str {
    match (role, status) {
        (Role::Doctor, UserStatus::PendingApproval) => {
            "Sign up request sent successfully and is waiting for Administrator's approval!"
        }
        (Role::Patient, UserStatus::Active) => "Sign up successful!",
        _ => "User created successfully!",
    }
}

/// Validate a sign-up form and hash its password into an insertable row.
pub(crate) fn new_user_from_form(
    form: &SignUp,
    status: UserStatus,
    require_dob: bool,
) -> Result<NewUser> {
    form.validate(require_dob).map_err(OncoError::Validation)?;
    Ok(NewUser {
        username: form.username.trim().to_string(),
        full_name: form.full_name(),
        role: form.role,
        status,
        id_number: form.id_number.trim().to_string(),
        dob: form.dob,
        digest: hash_password(form.password.as_str())?,
    })
}

/// Service for account access.
///
/// Unknown usernames and wrong passwords fail identically, including in
/// timing: a dummy Argon2 verification runs when the username is unknown.
pub struct Authenticator<S>
where
    S: ClinicStore,
{
    store: Arc<S>,
    upgrade_legacy_digests: bool,
}

impl<S> Authenticator<S>
where
    S: ClinicStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            upgrade_legacy_digests: false,
        }
    }

    /// Build the service with the configured legacy-digest policy.
    pub fn from_config(store: Arc<S>, config: &AppConfig) -> Self {
        Self::new(store).with_legacy_upgrade(config.upgrade_legacy_digests)
    }

    /// Re-hash legacy SHA-256 credentials with Argon2id after a successful login.
    #[must_use]
    pub fn with_legacy_upgrade(mut self, enabled: bool) -> Self {
        self.upgrade_legacy_digests = enabled;
        self
    }

    /// Self-service registration. Doctors start pending approval, patients
    /// active.
    ///
    /// # Errors
    /// `Validation` for an incomplete or inconsistent form or a non
    /// self-registrable role; `DuplicateKey` if the username or id number is
    /// taken.
    pub fn register(&self, form: &SignUp) -> Result<User> {
        if !form.role.self_registrable() {
            return Err(OncoError::Validation("Please select a valid role.".into()));
        }
        let status = form.role.initial_status();
        let new_user = new_user_from_form(form, status, false)?;

        let user_id = self.store.create_user(&new_user).map_err(store_err)?;
        tracing::info!(user_id, role = new_user.role.as_str(), status = status.as_str(), "User registered");

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

    /// Authenticate and open a session.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown username or wrong password;
    /// `PendingApproval` for correct credentials on an inactive account.
    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let Some(credentials) = self
            .store
            .find_credentials(username.trim())
            .map_err(store_err)?
        else {
            verify_against_dummy(password);
            tracing::warn!("Rejected login: unknown username");
            return Err(OncoError::InvalidCredentials);
        };

        let user = &credentials.user;
        if !verify_password(password, &credentials.digest) {
            tracing::warn!(user_id = user.user_id, "Rejected login: wrong password");
            return Err(OncoError::InvalidCredentials);
        }
        if !user.is_active() {
            tracing::info!(user_id = user.user_id, "Login refused: account pending approval");
            return Err(OncoError::PendingApproval);
        }

        if credentials.digest.needs_upgrade() {
            tracing::warn!(user_id = user.user_id, "Credential uses a legacy unsalted SHA-256 digest");
            if self.upgrade_legacy_digests {
                self.upgrade_digest(user.user_id, password);
            }
        }

        tracing::info!(user_id = user.user_id, role = user.role.as_str(), "User logged in");
        Ok(Session::for_user(user))
    }

    fn upgrade_digest(&self, user_id: i64, password: &str) {
        let upgraded = hash_password(password)
            .map_err(OncoError::from)
            .and_then(|digest| self.store.set_password(user_id, &digest).map_err(store_err));
        match upgraded {
            Ok(()) => tracing::info!(user_id, "Upgraded legacy digest to Argon2id"),
            Err(e) => tracing::warn!(user_id, "Legacy digest upgrade failed: {:?}", e),
        }
    }

    /// End a session. The value is consumed so it cannot be reused.
    pub fn logout(&self, session: Session) {
        tracing::info!(user_id = session.user_id, "User logged out");
    }

    /// Change the session user's own password.
    ///
    /// # Errors
    /// `Validation` when the new password is blank or unconfirmed;
    /// `InvalidCredentials` if `current` is wrong.
    pub fn change_password(
        &self,
        session: &Session,
        current: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<String> {
        if current.is_empty() || new_password.is_empty() {
            return Err(OncoError::Validation("Please fill in all required fields.".into()));
        }
        if new_password != confirm {
            return Err(OncoError::Validation(
                "Passwords do not match. Please try again.".into(),
            ));
        }

        let user = self
            .store
            .find_user(session.user_id)
            .map_err(store_err)?
            .ok_or_else(|| OncoError::NotFound("User".into()))?;
        let credentials = self
            .store
            .find_credentials(&user.username)
            .map_err(store_err)?
            .ok_or_else(|| OncoError::NotFound("User".into()))?;
        if !verify_password(current, &credentials.digest) {
            tracing::warn!(user_id = session.user_id, "Password change refused: wrong current password");
            return Err(OncoError::InvalidCredentials);
        }

        let digest = hash_password(new_password)?;
        self.store
            .set_password(session.user_id, &digest)
            .map_err(store_err)?;

        tracing::info!(user_id = session.user_id, "Password changed");
        Ok("Password updated successfully.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;
    use crate::domain::password::legacy_sha256_hex;
    use crate::domain::PasswordDigest;
    use crate::ports::ClinicStore;
    use chrono::NaiveDate;
    use zeroize::Zeroizing;

    fn form(username: &str, password: &str, role: Role, id_number: &str) -> SignUp {
        SignUp {
            first_name: "Test".into(),
            last_name: username.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
            confirm_password: Zeroizing::new(password.into()),
            role,
            id_number: id_number.into(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1),
        }
    }

    fn auth() -> (Arc<SqliteStore>, Authenticator<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        (store.clone(), Authenticator::new(store))
    }

    #[test]
    fn test_register_status_by_role() {
        let (_, auth) = auth();

        let patient = auth.register(&form("alice", "pw1", Role::Patient, "P-1")).expect("register");
        assert_eq!(patient.status, UserStatus::Active);
        assert_eq!(creation_message(patient.role, patient.status), "Sign up successful!");

        let doctor = auth.register(&form("bob", "pw2", Role::Doctor, "D-1")).expect("register");
        assert_eq!(doctor.status, UserStatus::PendingApproval);

        let admin = auth.register(&form("mallory", "pw3", Role::Admin, "A-1"));
        assert!(matches!(admin, Err(OncoError::Validation(_))));
    }

    #[test]
    fn test_register_duplicates() {
        let (_, auth) = auth();
        auth.register(&form("alice", "pw1", Role::Patient, "P-1")).expect("register");

        let same_username = auth.register(&form("alice", "pw9", Role::Patient, "P-2"));
        assert!(matches!(same_username, Err(OncoError::DuplicateKey)));
        let same_id = auth.register(&form("alice2", "pw9", Role::Patient, "P-1"));
        assert!(matches!(same_id, Err(OncoError::DuplicateKey)));

        // The first account still works.
        assert!(auth.login("alice", "pw1").is_ok());
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let (_, auth) = auth();
        auth.register(&form("alice", "pw1", Role::Patient, "P-1")).expect("register");

        let unknown = auth.login("nobody", "pw1").expect_err("unknown user");
        let wrong = auth.login("alice", "nope").expect_err("wrong password");
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, OncoError::InvalidCredentials));
        assert!(matches!(wrong, OncoError::InvalidCredentials));
    }

    #[test]
    fn test_pending_doctor_cannot_login() {
        let (_, auth) = auth();
        auth.register(&form("bob", "pw2", Role::Doctor, "D-1")).expect("register");

        assert!(matches!(auth.login("bob", "pw2"), Err(OncoError::PendingApproval)));
        // Wrong password still reports invalid credentials.
        assert!(matches!(auth.login("bob", "bad"), Err(OncoError::InvalidCredentials)));
    }

    #[test]
    fn test_legacy_digest_login_and_upgrade() {
        let (store, _) = auth();
        let config = AppConfig::from_lookup(|name| {
            (name == crate::config::UPGRADE_LEGACY_DIGESTS_ENV).then(|| "true".to_string())
        });
        let auth = Authenticator::from_config(store.clone(), &config);
        let user_id = store
            .create_user(&NewUser {
                username: "admin".into(),
                full_name: "Admin User".into(),
                role: Role::Admin,
                status: UserStatus::Active,
                id_number: "ADMIN0000".into(),
                dob: None,
                digest: PasswordDigest::from_stored(legacy_sha256_hex("admin123")).expect("parse"),
            })
            .expect("insert");

        let session = auth.login("admin", "admin123").expect("legacy login");
        assert_eq!(session.user_id, user_id);

        let creds = store.find_credentials("admin").expect("query").expect("exists");
        assert!(!creds.digest.needs_upgrade());
        assert!(auth.login("admin", "admin123").is_ok());
    }

    #[test]
    fn test_legacy_digest_kept_by_default() {
        let (store, _) = auth();
        let auth = Authenticator::from_config(store.clone(), &AppConfig::default());
        store
            .create_user(&NewUser {
                username: "admin".into(),
                full_name: "Admin User".into(),
                role: Role::Admin,
                status: UserStatus::Active,
                id_number: "ADMIN0000".into(),
                dob: None,
                digest: PasswordDigest::from_stored(legacy_sha256_hex("admin123")).expect("parse"),
            })
            .expect("insert");

        assert!(auth.login("admin", "admin123").is_ok());
        let creds = store.find_credentials("admin").expect("query").expect("exists");
        assert!(creds.digest.needs_upgrade());
    }

    #[test]
    fn test_change_password() {
        let (_, auth) = auth();
        auth.register(&form("alice", "pw1", Role::Patient, "P-1")).expect("register");
        let session = auth.login("alice", "pw1").expect("login");

        assert!(matches!(
            auth.change_password(&session, "wrong", "new", "new"),
            Err(OncoError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.change_password(&session, "pw1", "new", "other"),
            Err(OncoError::Validation(_))
        ));

        auth.change_password(&session, "pw1", "new", "new").expect("change");
        auth.logout(session);
        assert!(auth.login("alice", "pw1").is_err());
        assert!(auth.login("alice", "new").is_ok());
    }
}
