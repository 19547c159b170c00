//! Error taxonomy for the guard, resolver and backend client.
//!
//! ERROR HANDLING
//! ==============
//! `TransportError` is `Clone + PartialEq` because it is stored inside
//! `Session` and `WorkspaceContext` rather than thrown: the session store
//! absorbs identity failures and the resolver turns lookup failures into an
//! `Error` status. `GateError` is what public fallible operations return.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::fmt;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// The backend could not be asked, or its answer could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request did not complete (connection refused, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a status the caller does not handle.
    #[error("unexpected response status {status}")]
    Status { status: u16 },

    /// The response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The backend rejected the session credentials (HTTP 401).
    #[error("session rejected by backend")]
    Unauthorized,

    /// The HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_TRANSPORT_REQUEST",
            Self::Status { .. } => "E_TRANSPORT_STATUS",
            Self::Parse(_) => "E_TRANSPORT_PARSE",
            Self::Unauthorized => "E_TRANSPORT_UNAUTHORIZED",
            Self::ClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599 })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() { Self::Parse(e.to_string()) } else { Self::Request(e.to_string()) }
    }
}

// =============================================================================
// GATE ERROR
// =============================================================================

/// Which kind of record a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Organization,
    Project,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => f.write_str("organization"),
            Self::Project => f.write_str("project"),
        }
    }
}

/// Errors returned by tenantgate operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Network or backend failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The resource is legitimately absent.
    #[error("{kind} not found: {slug}")]
    NotFound { kind: ResourceKind, slug: String },

    /// The session is missing, expired or otherwise invalid.
    #[error("session is not authorized")]
    Unauthorized,

    /// Unknown feature flag, malformed route parameter or bad configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for GateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.error_code(),
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Configuration(_) => "E_CONFIGURATION",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.retryable(),
            _ => false,
        }
    }
}
