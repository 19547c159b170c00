//! Dashboard API client over `reqwest`.
//!
//! Thin HTTP wrapper for the identity and lookup endpoints. Status mapping
//! lives in small pure functions so it can be tested without a server.

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use super::{IdentityBackend, WorkspaceBackend};
use crate::config::{GateConfig, HttpTimeouts};
use crate::error::TransportError;
use crate::types::{Organization, Project, UserIdentity};

const ME_PATH: &str = "/api/auth/me";
const LOGOUT_PATH: &str = "/api/auth/logout";

pub(crate) fn organization_endpoint(org_slug: &str) -> String {
    format!("/api/organizations/{}", urlencoding::encode(org_slug))
}

pub(crate) fn project_endpoint(org_slug: &str, project_slug: &str) -> String {
    format!("{}/projects/{}", organization_endpoint(org_slug), urlencoding::encode(project_slug))
}

/// How a response status maps onto the lookup contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Found,
    Absent,
    Failed(TransportError),
}

/// `/api/auth/me`: 401 and 403 both mean "no session".
pub(crate) fn classify_identity(status: StatusCode) -> StatusClass {
    match status {
        s if s.is_success() => StatusClass::Found,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StatusClass::Absent,
        s => StatusClass::Failed(TransportError::Status { status: s.as_u16() }),
    }
}

/// Organization and project lookups: 404 is absent, 403 is reported as
/// absent so existence is not revealed, 401 means the session went away.
pub(crate) fn classify_lookup(status: StatusCode) -> StatusClass {
    match status {
        s if s.is_success() => StatusClass::Found,
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => StatusClass::Absent,
        StatusCode::UNAUTHORIZED => StatusClass::Failed(TransportError::Unauthorized),
        s => StatusClass::Failed(TransportError::Status { status: s.as_u16() }),
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for `base_url`, sending `session_token` as the
    /// `session_token` cookie when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(base_url: &str, session_token: Option<&str>, timeouts: HttpTimeouts) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = session_token {
            let cookie = HeaderValue::from_str(&format!("session_token={token}"))
                .map_err(|e| TransportError::ClientBuild(e.to_string()))?;
            headers.insert(COOKIE, cookie);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &GateConfig) -> Result<Self, TransportError> {
        Self::new(&config.api_base_url, config.session_token.as_deref(), config.timeouts)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        classify: fn(StatusCode) -> StatusClass,
    ) -> Result<Option<T>, TransportError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        tracing::debug!(%path, status = status.as_u16(), "backend response");
        match classify(status) {
            StatusClass::Found => Ok(Some(response.json::<T>().await?)),
            StatusClass::Absent => Ok(None),
            StatusClass::Failed(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl IdentityBackend for HttpBackend {
    async fn current_user(&self) -> Result<Option<UserIdentity>, TransportError> {
        self.get_optional(ME_PATH, classify_identity).await
    }

    async fn sign_out(&self) -> Result<(), TransportError> {
        let response = self.http.post(self.url(LOGOUT_PATH)).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(TransportError::Status { status: status.as_u16() })
        }
    }
}

#[async_trait::async_trait]
impl WorkspaceBackend for HttpBackend {
    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, TransportError> {
        self.get_optional(&organization_endpoint(slug), classify_lookup).await
    }

    async fn project_by_slug(
        &self,
        organization: &Organization,
        slug: &str,
    ) -> Result<Option<Project>, TransportError> {
        self.get_optional(&project_endpoint(&organization.slug, slug), classify_lookup).await
    }
}
