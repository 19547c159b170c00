//! Navigation URL helpers.
//!
//! SYSTEM CONTEXT
//! ==============
//! These are the only encoded formats this crate produces:
//! `{base}?redirect={urlencoded path}` to come back after signing in, and
//! `{base}?status={reason}` to tell the sign-in page why a session ended.

#[cfg(test)]
#[path = "redirect_test.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;

use crate::error::GateError;

pub const REDIRECT_PARAM: &str = "redirect";
pub const STATUS_PARAM: &str = "status";

/// Why a session ended, as signalled to the sign-in page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Expired,
    Ended,
    LogoutSuccess,
    LogoutError,
}

impl SessionEnd {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Ended => "ended",
            Self::LogoutSuccess => "logout_success",
            Self::LogoutError => "logout_error",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionEnd {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(Self::Expired),
            "ended" => Ok(Self::Ended),
            "logout_success" => Ok(Self::LogoutSuccess),
            "logout_error" => Ok(Self::LogoutError),
            other => Err(GateError::Configuration(format!("unknown session status: {other}"))),
        }
    }
}

// =============================================================================
// BUILDING
// =============================================================================

fn append_param(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{key}={}", urlencoding::encode(value))
}

/// `{base}?redirect={current_path}` with the path percent-encoded.
#[must_use]
pub fn with_return_to(base: &str, current_path: &str) -> String {
    append_param(base, REDIRECT_PARAM, current_path)
}

/// `{base}?status={reason}`.
#[must_use]
pub fn session_ended(base: &str, reason: SessionEnd) -> String {
    append_param(base, STATUS_PARAM, reason.as_str())
}

// =============================================================================
// READING
// =============================================================================

/// Decoded value of the first `key` parameter in `url`'s query string.
#[must_use]
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    let query = query.split_once('#').map_or(query, |(q, _)| q);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(std::borrow::Cow::into_owned)
}

/// The path to return to after signing in, if `url` carries a safe one.
///
/// Only same-origin absolute paths are accepted; protocol-relative
/// (`//host`) and backslash forms are dropped so the parameter cannot be
/// used as an open redirect.
#[must_use]
pub fn return_target(url: &str) -> Option<String> {
    query_param(url, REDIRECT_PARAM).filter(|path| is_local_path(path))
}

/// The session-end reason carried by `url`, if any.
#[must_use]
pub fn session_end_status(url: &str) -> Option<SessionEnd> {
    query_param(url, STATUS_PARAM).and_then(|raw| raw.parse().ok())
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
