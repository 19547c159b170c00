//! Feature flags sourced from deploy-time environment variables.
//!
//! DESIGN
//! ======
//! The set of flags is closed: `Flag` enumerates them and `FLAG_TABLE` maps
//! each to its name, so an unknown name is rejected at the boundary instead
//! of silently reading as off. A flag's environment key is
//! `FLAG_PREFIX + NAME` (uppercased), and only the literal string `"true"`
//! turns it on.

#[cfg(test)]
#[path = "flags_test.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::GateError;

pub const FLAG_PREFIX: &str = "TENANTGATE_FLAG_";

/// Every flag the dashboard knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Guard: signed-in users with an unverified email are sent to verification.
    RequireEmailVerification,
    /// Resolver: project segments in workspace paths resolve as not found.
    DisableProjects,
    /// Shell: a session that drops out from under a signed-in user redirects
    /// with `?status=expired` instead of a plain sign-in redirect.
    SessionExpiryRedirect,
}

const FLAG_TABLE: [(Flag, &str); 3] = [
    (Flag::RequireEmailVerification, "require_email_verification"),
    (Flag::DisableProjects, "disable_projects"),
    (Flag::SessionExpiryRedirect, "session_expiry_redirect"),
];

impl Flag {
    pub const ALL: [Flag; 3] = [Flag::RequireEmailVerification, Flag::DisableProjects, Flag::SessionExpiryRedirect];

    #[must_use]
    pub fn name(self) -> &'static str {
        FLAG_TABLE[self.index()].1
    }

    /// Environment variable consulted for this flag.
    #[must_use]
    pub fn env_key(self) -> String {
        format!("{FLAG_PREFIX}{}", self.name().to_ascii_uppercase())
    }

    fn index(self) -> usize {
        match self {
            Self::RequireEmailVerification => 0,
            Self::DisableProjects => 1,
            Self::SessionExpiryRedirect => 2,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flag {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FLAG_TABLE
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(flag, _)| *flag)
            .ok_or_else(|| GateError::Configuration(format!("unknown feature flag: {s}")))
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Evaluated value of every flag, computed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    values: [bool; 3],
}

impl FeatureFlags {
    /// Read every flag from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read every flag through `lookup`, which maps an environment key to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = [false; 3];
        for flag in Flag::ALL {
            values[flag.index()] = lookup(&flag.env_key()).as_deref() == Some("true");
        }
        Self { values }
    }

    /// Process-wide flags, read from the environment on first use.
    pub fn global() -> &'static FeatureFlags {
        static FLAGS: OnceLock<FeatureFlags> = OnceLock::new();
        FLAGS.get_or_init(Self::from_env)
    }

    /// Override a single flag.
    #[must_use]
    pub fn with(mut self, flag: Flag, enabled: bool) -> Self {
        self.values[flag.index()] = enabled;
        self
    }

    #[must_use]
    pub fn is_enabled(&self, flag: Flag) -> bool {
        self.values[flag.index()]
    }

    /// Look a flag up by its configured name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for names outside the flag table.
    pub fn is_enabled_by_name(&self, name: &str) -> Result<bool, GateError> {
        Ok(self.is_enabled(name.parse()?))
    }

    /// `(flag, enabled)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Flag, bool)> + '_ {
        Flag::ALL.into_iter().map(|flag| (flag, self.is_enabled(flag)))
    }
}

/// Evaluate one flag against the process-wide flag map.
#[must_use]
pub fn is_enabled(flag: Flag) -> bool {
    FeatureFlags::global().is_enabled(flag)
}
