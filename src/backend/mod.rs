//! Remote service seams.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store talks to an `IdentityBackend` and the workspace
//! resolver to a `WorkspaceBackend`. `http::HttpBackend` implements both
//! against the dashboard API; tests substitute `crate::test_helpers::MockBackend`.
//!
//! Lookups return `Ok(None)` for a legitimately absent record and `Err` only
//! when the backend could not be asked or answered unexpectedly.

pub mod http;

use crate::error::TransportError;
use crate::types::{Organization, Project, UserIdentity};

/// Identity endpoints consumed by the session store.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// The signed-in user, or `None` when the backend reports no session.
    async fn current_user(&self) -> Result<Option<UserIdentity>, TransportError>;

    /// End the server-side session.
    async fn sign_out(&self) -> Result<(), TransportError>;
}

/// Organization and project lookups consumed by the workspace resolver.
#[async_trait::async_trait]
pub trait WorkspaceBackend: Send + Sync {
    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, TransportError>;

    /// Look a project up under `organization`. The caller still checks that
    /// the returned record belongs to `organization`.
    async fn project_by_slug(&self, organization: &Organization, slug: &str)
    -> Result<Option<Project>, TransportError>;
}
