//! Backend records shared by the session store and the workspace resolver.
//!
//! DESIGN
//! ======
//! These mirror the JSON bodies of the backend's identity and lookup
//! endpoints so serde can decode responses directly.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

/// The signed-in visitor as returned by `/api/auth/me`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Unique user identifier.
    pub id: String,
    /// Primary email address.
    pub email: String,
    /// Whether the primary email address has been confirmed.
    #[serde(default)]
    pub is_email_verified: bool,
    /// Display name, if the user has set one.
    #[serde(default)]
    pub name: Option<String>,
}

/// An organization (tenant) addressed by slug in dashboard paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

/// A project owned by exactly one organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Owning organization's id; must match the organization in the path.
    pub organization_id: i64,
    pub slug: String,
    pub name: String,
}

impl Project {
    /// True when this project is owned by `organization`.
    #[must_use]
    pub fn belongs_to(&self, organization: &Organization) -> bool {
        self.organization_id == organization.id
    }
}
