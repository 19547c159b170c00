//! Authorization guard for protected routes.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected page runs the guard before rendering. The backend still
//! enforces authorization; the guard only decides whether to show a loading
//! state, redirect, or render the page.
//!
//! DESIGN
//! ======
//! `decide` is a pure transition function from `(Session, GuardConfig,
//! path)` to a guard state and an optional redirect command. `AuthGuard`
//! adds the one piece of memory the guard needs: which `(state, path)` it
//! last acted on, so re-rendering with an unchanged session never issues a
//! second redirect. Performing the redirect is a separate step through a
//! `Navigator`.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use std::fmt;
use std::sync::Arc;

use crate::flags::{FeatureFlags, Flag};
use crate::redirect;
use crate::session::Session;

pub const DEFAULT_SIGN_IN_PATH: &str = "/signin";
pub const DEFAULT_VERIFY_EMAIL_PATH: &str = "/verify-email";

/// Callback run instead of the default sign-in redirect; receives the path
/// the visitor was trying to reach.
pub type UnauthorizedHandler = Arc<dyn Fn(&str) + Send + Sync>;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Clone)]
pub struct GuardConfig {
    /// Sign-in location for unauthenticated visitors.
    pub redirect_to: String,
    /// Where signed-in users with an unverified email are sent.
    pub verify_email_path: String,
    pub require_email_verification: bool,
    pub on_unauthorized: Option<UnauthorizedHandler>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            redirect_to: DEFAULT_SIGN_IN_PATH.to_owned(),
            verify_email_path: DEFAULT_VERIFY_EMAIL_PATH.to_owned(),
            require_email_verification: false,
            on_unauthorized: None,
        }
    }
}

impl fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardConfig")
            .field("redirect_to", &self.redirect_to)
            .field("verify_email_path", &self.verify_email_path)
            .field("require_email_verification", &self.require_email_verification)
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .finish()
    }
}

impl GuardConfig {
    #[must_use]
    pub fn with_redirect_to(mut self, path: &str) -> Self {
        path.clone_into(&mut self.redirect_to);
        self
    }

    #[must_use]
    pub fn with_verify_email_path(mut self, path: &str) -> Self {
        path.clone_into(&mut self.verify_email_path);
        self
    }

    #[must_use]
    pub fn requiring_email_verification(mut self, required: bool) -> Self {
        self.require_email_verification = required;
        self
    }

    #[must_use]
    pub fn on_unauthorized<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(handler));
        self
    }

    /// Turn email verification on when the `require_email_verification`
    /// flag is set. The flag never turns it off.
    #[must_use]
    pub fn with_flags(mut self, flags: &FeatureFlags) -> Self {
        self.require_email_verification |= flags.is_enabled(Flag::RequireEmailVerification);
        self
    }
}

// =============================================================================
// VERDICT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthVerdict {
    Unauthenticated,
    EmailUnverified,
    Authorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// The identity check has not settled; show a loading indicator.
    Pending,
    Settled(AuthVerdict),
}

impl GuardState {
    #[must_use]
    pub fn is_authorized(self) -> bool {
        self == Self::Settled(AuthVerdict::Authorized)
    }

    #[must_use]
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }
}

/// A navigation the guard wants performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectCommand {
    Navigate(String),
    /// Run the configured unauthorized handler instead of navigating.
    Unauthorized { return_to: String },
}

/// Guard state for `session` under `config`.
#[must_use]
pub fn verdict(session: &Session, config: &GuardConfig) -> GuardState {
    if session.is_loading() {
        return GuardState::Pending;
    }
    match session.user() {
        None => GuardState::Settled(AuthVerdict::Unauthenticated),
        Some(user) if config.require_email_verification && !user.is_email_verified => {
            GuardState::Settled(AuthVerdict::EmailUnverified)
        }
        Some(_) => GuardState::Settled(AuthVerdict::Authorized),
    }
}

/// Pure guard transition: the state and the redirect (if any) it calls for.
#[must_use]
pub fn decide(session: &Session, config: &GuardConfig, current_path: &str) -> (GuardState, Option<RedirectCommand>) {
    let state = verdict(session, config);
    let command = match state {
        GuardState::Pending | GuardState::Settled(AuthVerdict::Authorized) => None,
        GuardState::Settled(AuthVerdict::Unauthenticated) => Some(match config.on_unauthorized {
            Some(_) => RedirectCommand::Unauthorized { return_to: current_path.to_owned() },
            None => RedirectCommand::Navigate(redirect::with_return_to(&config.redirect_to, current_path)),
        }),
        GuardState::Settled(AuthVerdict::EmailUnverified) => Some(RedirectCommand::Navigate(
            redirect::with_return_to(&config.verify_email_path, current_path),
        )),
    };
    (state, command)
}

// =============================================================================
// NAVIGATION
// =============================================================================

/// Performs navigations requested by the guard and the shell.
pub trait Navigator {
    fn navigate(&self, to: &str);
}

/// Guard outcome for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub state: GuardState,
    /// `None` when no redirect is needed or it was already issued.
    pub command: Option<RedirectCommand>,
}

/// Stateful wrapper over `decide` that issues each redirect once.
#[derive(Debug)]
pub struct AuthGuard {
    config: GuardConfig,
    last: Option<(GuardState, String)>,
}

impl AuthGuard {
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self { config, last: None }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Evaluate the guard; the command is suppressed when the state and path
    /// are unchanged since the previous evaluation.
    pub fn evaluate(&mut self, session: &Session, current_path: &str) -> GuardOutcome {
        let (state, command) = decide(session, &self.config, current_path);
        let key = (state, current_path.to_owned());
        if self.last.as_ref() == Some(&key) {
            return GuardOutcome { state, command: None };
        }
        self.last = Some(key);
        GuardOutcome { state, command }
    }

    /// Evaluate and perform the resulting redirect.
    pub fn enforce(&mut self, session: &Session, current_path: &str, navigator: &dyn Navigator) -> GuardState {
        let outcome = self.evaluate(session, current_path);
        if let Some(command) = &outcome.command {
            self.perform(command, navigator);
        }
        outcome.state
    }

    /// Forget the last evaluation so the next one may redirect again.
    pub fn reset(&mut self) {
        self.last = None;
    }

    fn perform(&self, command: &RedirectCommand, navigator: &dyn Navigator) {
        match command {
            RedirectCommand::Navigate(to) => {
                tracing::info!(%to, "guard redirect");
                navigator.navigate(to);
            }
            RedirectCommand::Unauthorized { return_to } => match &self.config.on_unauthorized {
                Some(handler) => {
                    tracing::info!(%return_to, "guard unauthorized handler");
                    handler(return_to);
                }
                None => navigator.navigate(&redirect::with_return_to(&self.config.redirect_to, return_to)),
            },
        }
    }
}
