//! One render pass of the dashboard shell.
//!
//! SYSTEM CONTEXT
//! ==============
//! The shell owns the ordering between the three stores: it reads the
//! session, runs the guard, and only then lets the workspace resolver look
//! anything up. Pages receive a `View` and never talk to the stores in that
//! order themselves.
//!
//! DESIGN
//! ======
//! The resolver is bound to the session store when the shell is built, so
//! a settled session for a different user (or none) invalidates it the
//! moment it is published, even mid-render. A render that finds the session
//! moved under an outstanding lookup goes round again so the guard decides
//! on the new session. The shell also remembers the last settled session it
//! rendered with, to tell an expiry apart from a sign-out.
//!
//! A lookup rejected with `Unauthorized` means the session expired behind
//! our back; the shell refreshes it once and renders again so the guard can
//! redirect.

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;

use std::sync::Arc;

use crate::error::{GateError, TransportError};
use crate::flags::{FeatureFlags, Flag};
use crate::guard::{AuthGuard, GuardConfig, Navigator};
use crate::redirect::{self, SessionEnd};
use crate::route::WorkspaceRoute;
use crate::session::{Session, SessionStore};
use crate::workspace::{WorkspaceContext, WorkspaceResolver, WorkspaceStatus};

/// What the page should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Session or workspace still resolving.
    Loading,
    /// A navigation was issued (or is already underway); render nothing.
    Redirecting,
    NotFound,
    Error(TransportError),
    /// Render the page. Carries the workspace on `/orgs/...` routes.
    Content(Option<WorkspaceContext>),
}

pub struct Shell<N: Navigator> {
    store: Arc<SessionStore>,
    resolver: WorkspaceResolver,
    guard: AuthGuard,
    flags: FeatureFlags,
    navigator: N,
    last_settled: Option<Session>,
}

impl<N: Navigator> Shell<N> {
    /// `config` is combined with `flags`, so the `require_email_verification`
    /// flag can turn verification on.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        resolver: WorkspaceResolver,
        config: GuardConfig,
        flags: FeatureFlags,
        navigator: N,
    ) -> Self {
        resolver.follow(&store);
        Self {
            store,
            resolver,
            guard: AuthGuard::new(config.with_flags(&flags)),
            flags,
            navigator,
            last_settled: None,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn resolver(&self) -> &WorkspaceResolver {
        &self.resolver
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// First render after the app starts: run the identity check, then render.
    ///
    /// # Errors
    ///
    /// See [`Shell::render`].
    pub async fn mount(&mut self, path: &str) -> Result<View, GateError> {
        self.store.refresh().await;
        self.render(path).await
    }

    /// Render `path` against the current session.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `path` is under `/orgs/` but
    /// carries a malformed slug.
    pub async fn render(&mut self, path: &str) -> Result<View, GateError> {
        let mut refreshed = false;
        loop {
            let session = self.store.get_session();
            if let Some(view) = self.observe(&session) {
                return Ok(view);
            }

            let state = self.guard.enforce(&session, path, &self.navigator);
            if !state.is_authorized() {
                // Hold the workspace at `Loading` for pages subscribed to it.
                if let Ok(Some(route)) = WorkspaceRoute::parse(path) {
                    self.resolver.resolve(state, &route).await;
                }
                return Ok(if state.is_pending() { View::Loading } else { View::Redirecting });
            }
            let Some(route) = WorkspaceRoute::parse(path)? else {
                self.resolver.clear();
                return Ok(View::Content(None));
            };

            let ctx = self.resolver.resolve(state, &route).await;
            match ctx.status() {
                WorkspaceStatus::Loading if self.store.get_session() != session => {
                    tracing::debug!(workspace = %route, "session changed during lookup; re-rendering");
                }
                WorkspaceStatus::Loading => return Ok(View::Loading),
                WorkspaceStatus::Ready => return Ok(View::Content(Some(ctx))),
                WorkspaceStatus::NotFound => return Ok(View::NotFound),
                WorkspaceStatus::Error => match ctx.error() {
                    Some(TransportError::Unauthorized) if !refreshed => {
                        tracing::info!(workspace = %route, "lookup rejected session; refreshing");
                        refreshed = true;
                        self.store.refresh().await;
                    }
                    Some(error) => return Ok(View::Error(error.clone())),
                    None => return Ok(View::Loading),
                },
            }
        }
    }

    /// End the session and send the visitor to the sign-in page with the
    /// outcome in `?status=`.
    pub async fn sign_out(&mut self) -> SessionEnd {
        let reason = self.store.sign_out().await;
        self.resolver.clear();
        self.last_settled = Some(self.store.get_session());
        self.guard.reset();
        let to = redirect::session_ended(&self.guard.config().redirect_to, reason);
        tracing::info!(%reason, %to, "signed out");
        self.navigator.navigate(&to);
        reason
    }

    /// Track settled session changes. Returns a view when the change itself
    /// decides the render. Invalidation already happened in the store's
    /// identity listener.
    fn observe(&mut self, session: &Session) -> Option<View> {
        if !session.is_settled() {
            return None;
        }
        let previous = self.last_settled.replace(session.clone())?;
        if previous.same_identity(session) {
            return None;
        }

        tracing::debug!(
            previous = previous.user().map(|u| u.id.as_str()),
            current = session.user().map(|u| u.id.as_str()),
            "session identity changed"
        );

        let expired = previous.user().is_some() && session.user().is_none();
        if expired && self.flags.is_enabled(Flag::SessionExpiryRedirect) {
            self.resolver.clear();
            let to = redirect::session_ended(&self.guard.config().redirect_to, SessionEnd::Expired);
            tracing::info!(%to, "session expired");
            self.navigator.navigate(&to);
            return Some(View::Redirecting);
        }
        None
    }
}
