//! Runtime configuration parsed from environment variables.
//!
//! Every key is optional:
//! - `TENANTGATE_API_URL`: dashboard API base URL (default `http://127.0.0.1:3000`)
//! - `TENANTGATE_SESSION_TOKEN`: sent as the `session_token` cookie
//! - `TENANTGATE_SIGN_IN_PATH`: default `/signin`
//! - `TENANTGATE_VERIFY_EMAIL_PATH`: default `/verify-email`
//! - `TENANTGATE_REQUIRE_EMAIL_VERIFICATION`: `1/true/yes/on` or `0/false/no/off`
//! - `TENANTGATE_REQUEST_TIMEOUT_SECS`: default 30
//! - `TENANTGATE_CONNECT_TIMEOUT_SECS`: default 10

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use crate::error::GateError;
use crate::guard::{DEFAULT_SIGN_IN_PATH, DEFAULT_VERIFY_EMAIL_PATH, GuardConfig};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub api_base_url: String,
    pub session_token: Option<String>,
    pub sign_in_path: String,
    pub verify_email_path: String,
    pub require_email_verification: bool,
    pub timeouts: HttpTimeouts,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_owned(),
            session_token: None,
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_owned(),
            verify_email_path: DEFAULT_VERIFY_EMAIL_PATH.to_owned(),
            require_email_verification: false,
            timeouts: HttpTimeouts::default(),
        }
    }
}

impl GateConfig {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unparseable values.
    pub fn from_env() -> Result<Self, GateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config through `lookup`, which maps a key to its value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a navigation path does not start
    /// with `/`, a boolean or number does not parse, or the token is blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("TENANTGATE_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let session_token = match lookup("TENANTGATE_SESSION_TOKEN") {
            Some(token) if token.trim().is_empty() => {
                return Err(GateError::Configuration("TENANTGATE_SESSION_TOKEN is blank".into()));
            }
            other => other,
        };
        let sign_in_path = parse_path("TENANTGATE_SIGN_IN_PATH", lookup("TENANTGATE_SIGN_IN_PATH"), DEFAULT_SIGN_IN_PATH)?;
        let verify_email_path = parse_path(
            "TENANTGATE_VERIFY_EMAIL_PATH",
            lookup("TENANTGATE_VERIFY_EMAIL_PATH"),
            DEFAULT_VERIFY_EMAIL_PATH,
        )?;
        let require_email_verification = match lookup("TENANTGATE_REQUIRE_EMAIL_VERIFICATION") {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                GateError::Configuration(format!("TENANTGATE_REQUIRE_EMAIL_VERIFICATION is not a boolean: {raw:?}"))
            })?,
        };
        let timeouts = HttpTimeouts {
            request_secs: parse_u64(
                "TENANTGATE_REQUEST_TIMEOUT_SECS",
                lookup("TENANTGATE_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            connect_secs: parse_u64(
                "TENANTGATE_CONNECT_TIMEOUT_SECS",
                lookup("TENANTGATE_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
        };

        Ok(Self { api_base_url, session_token, sign_in_path, verify_email_path, require_email_verification, timeouts })
    }

    /// Guard settings carried by this config.
    #[must_use]
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig::default()
            .with_redirect_to(&self.sign_in_path)
            .with_verify_email_path(&self.verify_email_path)
            .requiring_email_verification(self.require_email_verification)
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_path(key: &str, raw: Option<String>, default: &str) -> Result<String, GateError> {
    let path = raw.unwrap_or_else(|| default.to_owned());
    if path.starts_with('/') && !path.starts_with("//") {
        Ok(path)
    } else {
        Err(GateError::Configuration(format!("{key} must be an absolute path: {path:?}")))
    }
}

fn parse_u64(key: &str, raw: Option<String>, default: u64) -> Result<u64, GateError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| GateError::Configuration(format!("{key} is not a number: {v:?}"))),
    }
}
