//! The authenticated context passed into every workflow call.

use serde::{Deserialize, Serialize};

use super::user::{Role, User};

/// Immutable identity of the logged-in user.
///
/// Created by a successful login and consumed by logout. Workflows never
/// look up "the current user" from ambient state; they receive this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

impl Session {
    pub(crate) fn for_user(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
        }
    }

    /// Greeting shown once after login.
    #[must_use]
    pub fn welcome_message(&self) -> String {
        format!("Welcome back, {}!", self.full_name)
    }

    /// Screens available to this session.
    #[must_use]
    pub fn workspaces(&self) -> &'static [Workspace] {
        self.role.workspaces()
    }
}

/// A top-level screen of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workspace {
    UserManagement,
    DoctorApprovals,
    MyDashboard,
    Predict,
    PatientRequests,
    FindDoctor,
}

impl Workspace {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::UserManagement => "User Management",
            Self::DoctorApprovals => "Doctor Approvals",
            Self::MyDashboard => "My Dashboard",
            Self::Predict => "Predict",
            Self::PatientRequests => "Patient Requests",
            Self::FindDoctor => "Find Doctor",
        }
    }
}

impl Role {
    /// Navigation entries for this role, in display order.
    #[must_use]
    pub fn workspaces(self) -> &'static [Workspace] {
        match self {
            Role::Admin => &[Workspace::UserManagement, Workspace::DoctorApprovals],
            Role::Doctor => &[
                Workspace::MyDashboard,
                Workspace::Predict,
                Workspace::PatientRequests,
            ],
            Role::Patient => &[Workspace::MyDashboard, Workspace::FindDoctor],
        }
    }
}
