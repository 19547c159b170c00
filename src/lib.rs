//! # tenantgate
//!
//! Client-side authorization guard and multi-tenant workspace resolver for a
//! dashboard front end.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store holds who the visitor is, the auth guard turns that into
//! a verdict and at most one redirect per state change, and the workspace
//! resolver maps `/orgs/{org}/projects/{project}` paths onto validated
//! organization and project records. The backend enforces authorization on
//! its own; everything here decides what to render and where to navigate.
//!
//! DESIGN
//! ======
//! State lives in explicit owned stores (`SessionStore`, `WorkspaceResolver`)
//! that publish through `tokio::sync::watch`. Redirect decisions are a pure
//! function (`guard::decide`) and navigation is a separate thin step, so
//! every decision can be tested without a browser.

pub mod backend;
pub mod config;
pub mod error;
pub mod flags;
pub mod guard;
pub mod redirect;
pub mod route;
pub mod session;
pub mod shell;
pub mod types;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{GateError, TransportError};
pub use flags::{FeatureFlags, Flag};
pub use guard::{AuthGuard, AuthVerdict, GuardConfig, GuardState, Navigator, RedirectCommand};
pub use route::WorkspaceRoute;
pub use session::{Session, SessionStore};
pub use shell::{Shell, View};
pub use types::{Organization, Project, UserIdentity};
pub use workspace::{WorkspaceContext, WorkspaceResolver, WorkspaceStatus};
