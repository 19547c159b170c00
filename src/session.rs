//! Session state for the current visitor.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store is the single writer of `Session`. The auth guard and
//! the workspace resolver read it and subscribe to changes through a
//! `watch` channel; nothing else publishes.
//!
//! DESIGN
//! ======
//! `Session` fields are private so the loading invariant (a loading session
//! carries neither a user nor an error) holds by construction. Identity
//! failures are absorbed into `error` instead of being returned, so the
//! guard always has a well-formed session to branch on.
//!
//! Two counters keep the store honest in the face of overlapping calls:
//! `completed` lets a refresh that queued behind another reuse its result,
//! and `epoch` lets `sign_out`/`end` discard a refresh that was already in
//! flight when the session was torn down.
//!
//! Identity listeners run synchronously inside `publish` whenever the
//! settled user changes, whoever triggered it. The workspace resolver
//! registers one so a sign-out from any holder of the store drops the
//! previous user's workspace at once. Loading transitions in between do
//! not count, so a refresh that comes back with the same user fires nothing.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};

use crate::backend::IdentityBackend;
use crate::error::TransportError;
use crate::redirect::SessionEnd;
use crate::types::UserIdentity;

// =============================================================================
// SESSION
// =============================================================================

/// Who the current visitor is, as far as the client knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<Arc<UserIdentity>>,
    is_loading: bool,
    error: Option<TransportError>,
}

impl Session {
    /// An identity check is in flight.
    #[must_use]
    pub fn loading() -> Self {
        Self { user: None, is_loading: true, error: None }
    }

    #[must_use]
    pub fn authenticated(user: UserIdentity) -> Self {
        Self { user: Some(Arc::new(user)), is_loading: false, error: None }
    }

    /// The identity check completed and found no session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { user: None, is_loading: false, error: None }
    }

    /// The identity check could not be completed.
    #[must_use]
    pub fn failed(error: TransportError) -> Self {
        Self { user: None, is_loading: false, error: Some(error) }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_deref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_loading
    }

    /// True when both sessions belong to the same signed-in user (or both
    /// have none), ignoring loading and error details.
    #[must_use]
    pub fn same_identity(&self, other: &Session) -> bool {
        self.user().map(|u| &u.id) == other.user().map(|u| &u.id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Owner of the current `Session`.
///
/// Created when the app starts (in the loading state, since the identity
/// check has not run yet) and shared by `Arc` with the guard, the resolver
/// and the UI.
pub struct SessionStore {
    backend: Arc<dyn IdentityBackend>,
    state: watch::Sender<Session>,
    refresh_gate: Mutex<()>,
    completed: AtomicU64,
    epoch: AtomicU64,
    /// User id of the last settled session; `None` until one settles.
    settled_identity: std::sync::Mutex<Option<Option<String>>>,
    listeners: std::sync::Mutex<Vec<IdentityListener>>,
}

/// Called with the new session when the settled identity changes.
pub type IdentityListener = Box<dyn Fn(&Session) + Send + Sync>;

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        let (state, _) = watch::channel(Session::loading());
        Self {
            backend,
            state,
            refresh_gate: Mutex::new(()),
            completed: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            settled_identity: std::sync::Mutex::new(None),
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Synchronous read of the current session.
    #[must_use]
    pub fn get_session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every session transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Run `listener` every time a settled session for a different user
    /// (or for no user) replaces the previous settled one.
    pub fn on_identity_change<F>(&self, listener: F)
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Box::new(listener));
    }

    /// Re-query the identity endpoint and publish the result.
    ///
    /// Never fails: transport errors land in `Session::error`. A call made
    /// while another refresh is in flight waits for it and returns its
    /// result instead of issuing a second identity request.
    pub async fn refresh(&self) -> Session {
        let observed = self.completed.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.completed.load(Ordering::Acquire) != observed {
            return self.get_session();
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        self.publish(Session::loading());
        let next = match self.backend.current_user().await {
            Ok(Some(user)) => {
                tracing::debug!(user_id = %user.id, "session authenticated");
                Session::authenticated(user)
            }
            Ok(None) => {
                tracing::debug!("no active session");
                Session::anonymous()
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity check failed");
                Session::failed(e)
            }
        };
        self.completed.fetch_add(1, Ordering::AcqRel);

        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!("session ended during refresh; discarding identity result");
            return self.get_session();
        }
        self.publish(next.clone());
        next
    }

    /// End the session on the backend and locally.
    ///
    /// The local session becomes anonymous either way; the returned reason
    /// tells the sign-in page whether the backend confirmed the logout.
    pub async fn sign_out(&self) -> SessionEnd {
        let result = self.backend.sign_out().await;
        let reason = match result {
            Ok(()) => SessionEnd::LogoutSuccess,
            Err(e) => {
                tracing::warn!(error = %e, "backend logout failed");
                SessionEnd::LogoutError
            }
        };
        self.end(reason);
        reason
    }

    /// Tear the session down locally, e.g. after the backend reported it
    /// expired. Any refresh still in flight is discarded on arrival.
    pub fn end(&self, reason: SessionEnd) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        tracing::info!(%reason, "session ended");
        self.publish(Session::anonymous());
    }

    fn publish(&self, next: Session) {
        let settled_user = next.is_settled().then(|| next.user().map(|u| u.id.clone()));
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            current.clone_from(&next);
            true
        });

        let Some(user_id) = settled_user else {
            return;
        };
        let previous =
            self.settled_identity.lock().unwrap_or_else(std::sync::PoisonError::into_inner).replace(user_id.clone());
        if matches!(previous, Some(prev) if prev != user_id) {
            tracing::debug!(user_id = user_id.as_deref(), "settled identity changed");
            for listener in self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter() {
                listener(&next);
            }
        }
    }
}
