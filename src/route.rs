//! Workspace route parsing.
//!
//! Workspace pages live under `/orgs/{org_slug}` and, for project pages,
//! `/orgs/{org_slug}/projects/{project_slug}`; anything after those segments
//! belongs to the nested page. Query string and fragment are ignored.

#[cfg(test)]
#[path = "route_test.rs"]
mod tests;

use std::fmt;

use crate::error::GateError;

const ORGS_SEGMENT: &str = "orgs";
const PROJECTS_SEGMENT: &str = "projects";
const MAX_SLUG_LEN: usize = 64;

/// True for 1-64 characters of ASCII alphanumerics, `-` and `_`.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn checked_slug(kind: &str, slug: &str) -> Result<String, GateError> {
    if is_valid_slug(slug) {
        Ok(slug.to_owned())
    } else {
        Err(GateError::Configuration(format!("malformed {kind} slug: {slug:?}")))
    }
}

/// The `(org_slug, project_slug)` pair a workspace context is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceRoute {
    org_slug: String,
    project_slug: Option<String>,
}

impl WorkspaceRoute {
    /// # Errors
    ///
    /// Returns a configuration error if either slug is malformed.
    pub fn new(org_slug: &str, project_slug: Option<&str>) -> Result<Self, GateError> {
        Ok(Self {
            org_slug: checked_slug("organization", org_slug)?,
            project_slug: project_slug.map(|slug| checked_slug("project", slug)).transpose()?,
        })
    }

    /// Extract the workspace route from a URL path.
    ///
    /// Returns `Ok(None)` for paths outside `/orgs/`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the path is under `/orgs/` but a
    /// slug segment is missing or malformed.
    pub fn parse(path: &str) -> Result<Option<Self>, GateError> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        if segments.next() != Some(ORGS_SEGMENT) {
            return Ok(None);
        }
        let Some(org_slug) = segments.next() else {
            return Err(GateError::Configuration(format!("missing organization slug in {path:?}")));
        };
        let project_slug = match segments.next() {
            Some(PROJECTS_SEGMENT) => match segments.next() {
                Some(slug) => Some(slug),
                None => return Err(GateError::Configuration(format!("missing project slug in {path:?}"))),
            },
            _ => None,
        };
        Self::new(org_slug, project_slug).map(Some)
    }

    #[must_use]
    pub fn org_slug(&self) -> &str {
        &self.org_slug
    }

    #[must_use]
    pub fn project_slug(&self) -> Option<&str> {
        self.project_slug.as_deref()
    }

    /// Canonical path of the workspace root.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.project_slug {
            Some(project) => format!("/{ORGS_SEGMENT}/{}/{PROJECTS_SEGMENT}/{project}", self.org_slug),
            None => format!("/{ORGS_SEGMENT}/{}", self.org_slug),
        }
    }
}

impl fmt::Display for WorkspaceRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project_slug {
            Some(project) => write!(f, "{}/{project}", self.org_slug),
            None => f.write_str(&self.org_slug),
        }
    }
}
