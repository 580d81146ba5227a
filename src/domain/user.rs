//! User accounts: roles, activation status, and the forms that create them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::password::PasswordDigest;

/// Fixed category of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Doctor, Role::Patient];

    /// Database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "doctor" => Some(Self::Doctor),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }

    /// Roles a visitor may pick on the public sign-up form.
    #[must_use]
    pub fn self_registrable(self) -> bool {
        match self {
            Self::Admin => false,
            Self::Doctor | Self::Patient => true,
        }
    }

    /// Status a self-registered account starts in.
    #[must_use]
    pub fn initial_status(self) -> UserStatus {
        match self {
            Self::Doctor => UserStatus::PendingApproval,
            Self::Admin | Self::Patient => UserStatus::Active,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "Admin"),
            Self::Doctor => write!(f, "Doctor"),
            Self::Patient => write!(f, "Patient"),
        }
    }
}

/// Account activation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// May authenticate.
    Active,
    /// Doctor awaiting administrator sign-off.
    PendingApproval,
}

impl UserStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingApproval => "pending_approval",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "pending_approval" => Some(Self::PendingApproval),
            _ => None,
        }
    }
}

/// A user record as shown to callers. Never carries the credential digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub id_number: String,
    pub dob: Option<NaiveDate>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A user together with the stored digest, for authentication only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub digest: PasswordDigest,
}

/// A fully validated user ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub status: UserStatus,
    pub id_number: String,
    pub dob: Option<NaiveDate>,
    pub digest: PasswordDigest,
}

/// Partial edit of a stored user. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub id_number: Option<String>,
    pub dob: Option<NaiveDate>,
    pub digest: Option<PasswordDigest>,
}

impl UserUpdate {
    /// Treat blank text fields as "not supplied".
    #[must_use]
    pub fn normalized(mut self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        self.username = keep(self.username);
        self.full_name = keep(self.full_name);
        self.id_number = keep(self.id_number);
        self
    }

    /// Merge the supplied fields over `current`.
    #[must_use]
    pub fn merge(&self, current: &User) -> User {
        User {
            user_id: current.user_id,
            username: self
                .username
                .clone()
                .unwrap_or_else(|| current.username.clone()),
            full_name: self
                .full_name
                .clone()
                .unwrap_or_else(|| current.full_name.clone()),
            role: self.role.unwrap_or(current.role),
            status: self.status.unwrap_or(current.status),
            id_number: self
                .id_number
                .clone()
                .unwrap_or_else(|| current.id_number.clone()),
            dob: self.dob.or(current.dob),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.full_name.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.id_number.is_none()
            && self.dob.is_none()
            && self.digest.is_none()
    }
}

pub const MAX_USERNAME_CHARS: usize = 20;
pub const MAX_ID_NUMBER_CHARS: usize = 18;

/// Length limits shared by sign-up and administrator edits. Surrounding
/// whitespace is not counted.
///
/// # Errors
/// Returns the user-facing message for the first field over its limit.
pub fn check_identifier_lengths(username: &str, id_number: &str) -> Result<(), String> {
    if username.trim().chars().count() > MAX_USERNAME_CHARS {
        return Err(format!("Username must be at most {MAX_USERNAME_CHARS} characters."));
    }
    if id_number.trim().chars().count() > MAX_ID_NUMBER_CHARS {
        return Err(format!("ID number must be at most {MAX_ID_NUMBER_CHARS} characters."));
    }
    Ok(())
}

/// Raw sign-up form input.
///
/// Used both by public registration and by administrator-initiated creation.
/// `Debug` omits both password fields.
#[derive(Clone)]
pub struct SignUp {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub confirm_password: Zeroizing<String>,
    pub role: Role,
    pub id_number: String,
    pub dob: Option<NaiveDate>,
}

impl std::fmt::Debug for SignUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUp")
            .field("username", &self.username)
            .field("full_name", &self.full_name())
            .field("role", &self.role)
            .field("dob", &self.dob)
            .finish_non_exhaustive()
    }
}

impl SignUp {
    /// Display name assembled from first and last name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Validate required fields and password confirmation.
    ///
    /// # Errors
    /// Returns a short user-facing message describing the first problem found.
    pub fn validate(&self, require_dob: bool) -> Result<(), String> {
        let blank = self.full_name().is_empty()
            || self.username.trim().is_empty()
            || self.password.is_empty()
            || self.id_number.trim().is_empty()
            || (require_dob && self.dob.is_none());
        if blank {
            return Err("Please fill in all required fields.".to_string());
        }
        if self.password.as_str() != self.confirm_password.as_str() {
            return Err("Passwords do not match. Please try again.".to_string());
        }
        check_identifier_lengths(&self.username, &self.id_number)?;
        if let Some(dob) = self.dob {
            if dob > chrono::Local::now().date_naive() {
                return Err("Date of birth cannot be in the future.".to_string());
            }
        }
        Ok(())
    }
}
