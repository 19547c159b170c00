//! Workspace resolution: URL slugs to validated organization/project records.
//!
//! SYSTEM CONTEXT
//! ==============
//! Nested workspace pages read the current `WorkspaceContext` through
//! `subscribe()`/`current()`. Only the resolver writes it.
//!
//! DESIGN
//! ======
//! A context is keyed by the literal `(org_slug, project_slug)` pair. When
//! the key changes, or the session changes under it, the resolver bumps its
//! generation and starts from a fresh `Loading` context. Every lookup
//! carries the generation it started under and is dropped on arrival if the
//! generation has moved on, so a slow response for an old organization can
//! never land in a newer context.
//!
//! The resolver follows a `SessionStore` (`follow`). A change of signed-in
//! identity invalidates it synchronously, from whichever caller ended or
//! replaced the session, so a lookup that started under the previous user
//! always arrives stale.
//!
//! While the guard is not authorized the published status is `Loading`.
//! A settled context for the same key is parked meanwhile and restored
//! without a lookup once the guard authorizes again; an identity change
//! throws the parked context away with everything else.
//!
//! TRADE-OFFS
//! ==========
//! `Error` contexts are retried on the next `resolve` for the same key,
//! while `Ready` and `NotFound` are kept until the key or session changes.

#[cfg(test)]
#[path = "workspace_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::backend::WorkspaceBackend;
use crate::error::TransportError;
use crate::flags::{FeatureFlags, Flag};
use crate::guard::GuardState;
use crate::route::WorkspaceRoute;
use crate::session::SessionStore;
use crate::types::{Organization, Project};

// =============================================================================
// CONTEXT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceStatus {
    Loading,
    Ready,
    NotFound,
    Error,
}

impl WorkspaceStatus {
    /// `Ready` and `NotFound` stay put until the key or session changes.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Ready | Self::NotFound)
    }
}

/// Resolved operating context for workspace pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    route: WorkspaceRoute,
    organization: Option<Organization>,
    project: Option<Project>,
    status: WorkspaceStatus,
    error: Option<TransportError>,
}

impl WorkspaceContext {
    fn loading(route: WorkspaceRoute) -> Self {
        Self { route, organization: None, project: None, status: WorkspaceStatus::Loading, error: None }
    }

    fn not_found(route: WorkspaceRoute) -> Self {
        Self { status: WorkspaceStatus::NotFound, ..Self::loading(route) }
    }

    fn failed(route: WorkspaceRoute, error: TransportError) -> Self {
        Self { status: WorkspaceStatus::Error, error: Some(error), ..Self::loading(route) }
    }

    /// `Ready` only when the records match the route; otherwise `NotFound`.
    fn ready(route: WorkspaceRoute, organization: Organization, project: Option<Project>) -> Self {
        let consistent = match (route.project_slug(), &project) {
            (None, None) => true,
            (Some(_), Some(p)) => p.belongs_to(&organization),
            _ => false,
        };
        if !consistent {
            return Self::not_found(route);
        }
        Self { route, organization: Some(organization), project, status: WorkspaceStatus::Ready, error: None }
    }

    /// Same records, `Loading` status.
    fn parked(&self) -> Self {
        Self { status: WorkspaceStatus::Loading, error: None, ..self.clone() }
    }

    #[must_use]
    pub fn route(&self) -> &WorkspaceRoute {
        &self.route
    }

    #[must_use]
    pub fn org_slug(&self) -> &str {
        self.route.org_slug()
    }

    #[must_use]
    pub fn project_slug(&self) -> Option<&str> {
        self.route.project_slug()
    }

    #[must_use]
    pub fn organization(&self) -> Option<&Organization> {
        self.organization.as_ref()
    }

    #[must_use]
    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> WorkspaceStatus {
        self.status
    }

    /// The transport failure behind an `Error` status.
    #[must_use]
    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

struct ResolverState {
    generation: u64,
    /// Generation of the lookup currently in flight, if any.
    in_flight: Option<u64>,
    /// Settled context held back while the guard is not authorized.
    parked: Option<WorkspaceContext>,
}

impl ResolverState {
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.in_flight = None;
        self.parked = None;
        self.generation
    }
}

/// State shared with the session listener registered by `follow`.
struct Shared {
    context: watch::Sender<Option<WorkspaceContext>>,
    state: Mutex<ResolverState>,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn invalidate(&self) {
        let generation = self.state().bump();
        self.context.send_modify(|ctx| {
            if let Some(current) = ctx {
                *current = WorkspaceContext::loading(current.route.clone());
            }
        });
        tracing::debug!(generation, "workspace invalidated");
    }
}

/// Releases the in-flight slot if a lookup future is dropped before it
/// commits, and wakes anyone waiting on it.
struct InFlight<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        if state.in_flight == Some(self.generation) {
            state.in_flight = None;
            drop(state);
            self.shared.context.send_modify(|_| {});
        }
    }
}

enum Claim {
    Acquired,
    Settled(WorkspaceContext),
    Wait,
}

/// Single writer of the current `WorkspaceContext`.
pub struct WorkspaceResolver {
    backend: Arc<dyn WorkspaceBackend>,
    flags: FeatureFlags,
    shared: Arc<Shared>,
}

impl WorkspaceResolver {
    #[must_use]
    pub fn new(backend: Arc<dyn WorkspaceBackend>, flags: FeatureFlags) -> Self {
        let (context, _) = watch::channel(None);
        let state = Mutex::new(ResolverState { generation: 0, in_flight: None, parked: None });
        Self { backend, flags, shared: Arc::new(Shared { context, state }) }
    }

    /// Invalidate whenever `store` settles on a different identity.
    pub fn follow(&self, store: &SessionStore) {
        let shared = Arc::downgrade(&self.shared);
        store.on_identity_change(move |_| {
            if let Some(shared) = shared.upgrade() {
                shared.invalidate();
            }
        });
    }

    /// Current context, or `None` outside workspace routes.
    #[must_use]
    pub fn current(&self) -> Option<WorkspaceContext> {
        self.shared.context.borrow().clone()
    }

    /// Read-only view for descendant pages.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<WorkspaceContext>> {
        self.shared.context.subscribe()
    }

    /// Resolve `route` once the guard has settled.
    ///
    /// Issues no lookup unless `guard` is `Settled(Authorized)`; until then
    /// the context for `route` is `Loading`.
    pub async fn resolve(&self, guard: GuardState, route: &WorkspaceRoute) -> WorkspaceContext {
        let generation = self.enter(route);
        if !guard.is_authorized() {
            return self.park(route);
        }

        match self.claim(generation, route) {
            Claim::Settled(ctx) => return ctx,
            Claim::Wait => return self.wait_settled(generation, route).await,
            Claim::Acquired => {}
        }

        let _in_flight = InFlight { shared: &self.shared, generation };
        let resolved = self.lookup(route).await;
        self.commit(generation, resolved)
    }

    /// Discard the current context's records because the session changed.
    ///
    /// The route is kept and goes back to `Loading`; lookups in flight are
    /// dropped when they arrive.
    pub fn invalidate(&self) {
        self.shared.invalidate();
    }

    /// Drop the context entirely, e.g. when navigating outside `/orgs/`.
    pub fn clear(&self) {
        self.shared.state().bump();
        self.shared.context.send_if_modified(|ctx| ctx.take().is_some());
    }

    /// Start a fresh context when `route` differs from the current key.
    fn enter(&self, route: &WorkspaceRoute) -> u64 {
        let mut state = self.shared.state();
        let same_key = self.shared.context.borrow().as_ref().is_some_and(|ctx| ctx.route == *route);
        if !same_key {
            let generation = state.bump();
            tracing::debug!(workspace = %route, generation, "workspace key changed");
            self.shared.context.send_replace(Some(WorkspaceContext::loading(route.clone())));
        }
        state.generation
    }

    /// Publish `Loading` for `route`, holding a settled context back until
    /// the guard authorizes again.
    fn park(&self, route: &WorkspaceRoute) -> WorkspaceContext {
        let mut state = self.shared.state();
        self.shared.context.send_if_modified(|ctx| match ctx {
            Some(current) if current.route == *route && current.status != WorkspaceStatus::Loading => {
                if current.status.is_final() {
                    tracing::debug!(workspace = %route, "parking workspace until guard authorizes");
                    state.parked = Some(current.clone());
                    *current = current.parked();
                } else {
                    *current = WorkspaceContext::loading(route.clone());
                }
                true
            }
            _ => false,
        });
        drop(state);
        self.context_for(route)
    }

    fn claim(&self, generation: u64, route: &WorkspaceRoute) -> Claim {
        let mut state = self.shared.state();
        if let Some(parked) = state.parked.take_if(|ctx| ctx.route == *route) {
            tracing::debug!(workspace = %route, "restoring parked workspace");
            self.shared.context.send_replace(Some(parked.clone()));
            return Claim::Settled(parked);
        }
        if let Some(ctx) = self.shared.context.borrow().as_ref().filter(|ctx| ctx.route == *route) {
            if ctx.status.is_final() {
                return Claim::Settled(ctx.clone());
            }
        }
        if state.in_flight == Some(generation) {
            return Claim::Wait;
        }
        state.in_flight = Some(generation);
        drop(state);
        self.shared.context.send_if_modified(|ctx| match ctx {
            Some(current) if current.status == WorkspaceStatus::Error => {
                *current = WorkspaceContext::loading(current.route.clone());
                true
            }
            _ => false,
        });
        Claim::Acquired
    }

    async fn lookup(&self, route: &WorkspaceRoute) -> WorkspaceContext {
        let org_slug = route.org_slug();
        let organization = match self.backend.organization_by_slug(org_slug).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                tracing::debug!(org = %org_slug, "organization not found");
                return WorkspaceContext::not_found(route.clone());
            }
            Err(e) => {
                tracing::warn!(org = %org_slug, error = %e, "organization lookup failed");
                return WorkspaceContext::failed(route.clone(), e);
            }
        };

        let Some(project_slug) = route.project_slug() else {
            return WorkspaceContext::ready(route.clone(), organization, None);
        };
        if self.flags.is_enabled(Flag::DisableProjects) {
            tracing::debug!(org = %org_slug, project = %project_slug, "projects disabled by flag");
            return WorkspaceContext::not_found(route.clone());
        }

        match self.backend.project_by_slug(&organization, project_slug).await {
            Ok(Some(project)) if project.belongs_to(&organization) => {
                WorkspaceContext::ready(route.clone(), organization, Some(project))
            }
            Ok(Some(project)) => {
                tracing::warn!(
                    org = %org_slug,
                    project = %project_slug,
                    expected_org_id = organization.id,
                    actual_org_id = project.organization_id,
                    "project belongs to a different organization"
                );
                WorkspaceContext::not_found(route.clone())
            }
            Ok(None) => {
                tracing::debug!(org = %org_slug, project = %project_slug, "project not found");
                WorkspaceContext::not_found(route.clone())
            }
            Err(e) => {
                tracing::warn!(org = %org_slug, project = %project_slug, error = %e, "project lookup failed");
                WorkspaceContext::failed(route.clone(), e)
            }
        }
    }

    /// Publish `resolved` if its generation is still current.
    fn commit(&self, generation: u64, resolved: WorkspaceContext) -> WorkspaceContext {
        let mut state = self.shared.state();
        if state.generation != generation {
            tracing::debug!(
                workspace = %resolved.route,
                stale = generation,
                current = state.generation,
                "discarding stale workspace lookup"
            );
            drop(state);
            return self.context_for(&resolved.route);
        }
        state.in_flight = None;
        self.shared.context.send_replace(Some(resolved.clone()));
        resolved
    }

    /// Wait for the lookup already in flight for `generation`.
    async fn wait_settled(&self, generation: u64, route: &WorkspaceRoute) -> WorkspaceContext {
        let mut rx = self.shared.context.subscribe();
        loop {
            {
                let state = self.shared.state();
                let ctx = rx.borrow_and_update();
                let settled = ctx.as_ref().is_some_and(|c| c.status != WorkspaceStatus::Loading);
                if state.generation != generation || state.in_flight != Some(generation) || settled {
                    break;
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.context_for(route)
    }

    /// Current context if it is for `route`, else a loading placeholder.
    fn context_for(&self, route: &WorkspaceRoute) -> WorkspaceContext {
        self.shared
            .context
            .borrow()
            .as_ref()
            .filter(|ctx| ctx.route == *route)
            .cloned()
            .unwrap_or_else(|| WorkspaceContext::loading(route.clone()))
    }
}
