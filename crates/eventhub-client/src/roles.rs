//! Roles and the admin sections they may open.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::session::{SessionStore, User};

/// Role of an admin-panel account, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Moderator,
    #[default]
    #[serde(other)]
    User,
}

/// Top-level areas of the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Dashboard,
    Events,
    Communities,
    Users,
    Settings,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Dashboard,
        Section::Events,
        Section::Communities,
        Section::Users,
        Section::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Events => "events",
            Self::Communities => "communities",
            Self::Users => "users",
            Self::Settings => "settings",
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::User => "user",
        }
    }

    /// Whether this role may open `section`.
    ///
    /// Platform settings are reserved for super admins, user management for
    /// admins and above. Plain users get nothing.
    pub fn can_access(&self, section: Section) -> bool {
        match self {
            Self::SuperAdmin => true,
            Self::Admin => section != Section::Settings,
            Self::Moderator => matches!(
                section,
                Section::Dashboard | Section::Events | Section::Communities
            ),
            Self::User => false,
        }
    }

    /// Sections visible to this role, in menu order.
    pub fn sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.can_access(*s))
            .collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the current user if their role grants `section`.
pub fn require_section(session: &SessionStore, section: Section) -> Result<User, ApiError> {
    let user = session.user().ok_or(ApiError::Unauthenticated)?;
    if user.role.can_access(section) {
        Ok(user)
    } else {
        tracing::debug!(role = %user.role, %section, "section denied");
        Err(ApiError::Forbidden {
            role: user.role,
            section,
        })
    }
}
