//! Shared fixtures for unit tests.
//!
//! `MockBackend` is an in-memory backend. Records are seeded up front, every
//! call is counted, failures can be injected, and lookups for a chosen slug
//! can be held behind a semaphore so tests control when an in-flight request
//! completes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::backend::{IdentityBackend, WorkspaceBackend};
use crate::error::TransportError;
use crate::guard::Navigator;
use crate::types::{Organization, Project, UserIdentity};

#[must_use]
pub fn user(id: &str, verified: bool) -> UserIdentity {
    UserIdentity { id: id.to_owned(), email: format!("{id}@example.com"), is_email_verified: verified, name: None }
}

#[must_use]
pub fn org(id: i64, slug: &str) -> Organization {
    Organization { id, slug: slug.to_owned(), name: slug.to_uppercase() }
}

#[must_use]
pub fn project(id: i64, organization_id: i64, slug: &str) -> Project {
    Project { id, organization_id, slug: slug.to_owned(), name: slug.to_uppercase() }
}

#[derive(Default)]
struct Records {
    user: Option<UserIdentity>,
    identity_error: Option<TransportError>,
    logout_error: Option<TransportError>,
    organizations: HashMap<String, Result<Organization, TransportError>>,
    projects: HashMap<(String, String), Result<Project, TransportError>>,
}

#[derive(Default)]
pub struct MockBackend {
    records: Mutex<Records>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    pub identity_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub organization_calls: AtomicUsize,
    pub project_calls: AtomicUsize,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_user(&self, user: Option<UserIdentity>) {
        let mut records = self.records();
        records.user = user;
        records.identity_error = None;
    }

    pub fn fail_identity(&self, error: TransportError) {
        self.records().identity_error = Some(error);
    }

    pub fn fail_logout(&self, error: TransportError) {
        self.records().logout_error = Some(error);
    }

    pub fn add_org(&self, organization: Organization) {
        self.records().organizations.insert(organization.slug.clone(), Ok(organization));
    }

    pub fn fail_org(&self, slug: &str, error: TransportError) {
        self.records().organizations.insert(slug.to_owned(), Err(error));
    }

    /// Serve `project` when it is looked up under `org_slug`, whatever its
    /// `organization_id` says.
    pub fn add_project(&self, org_slug: &str, project: Project) {
        self.records().projects.insert((org_slug.to_owned(), project.slug.clone()), Ok(project));
    }

    pub fn fail_project(&self, org_slug: &str, project_slug: &str, error: TransportError) {
        self.records().projects.insert((org_slug.to_owned(), project_slug.to_owned()), Err(error));
    }

    /// Hold lookups (identity uses the key `"me"`) until `release` is called.
    pub fn hold(&self, key: &str) {
        self.gates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, key: &str) {
        if let Some(gate) = self.gates.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(key) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(key).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
    }

    #[must_use]
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IdentityBackend for MockBackend {
    async fn current_user(&self) -> Result<Option<UserIdentity>, TransportError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate("me").await;
        let records = self.records();
        match &records.identity_error {
            Some(e) => Err(e.clone()),
            None => Ok(records.user.clone()),
        }
    }

    async fn sign_out(&self) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records();
        if let Some(e) = records.logout_error.clone() {
            return Err(e);
        }
        records.user = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkspaceBackend for MockBackend {
    async fn organization_by_slug(&self, slug: &str) -> Result<Option<Organization>, TransportError> {
        self.organization_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(slug).await;
        self.records().organizations.get(slug).cloned().transpose()
    }

    async fn project_by_slug(
        &self,
        organization: &Organization,
        slug: &str,
    ) -> Result<Option<Project>, TransportError> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate(&format!("{}/{slug}", organization.slug)).await;
        self.records().projects.get(&(organization.slug.clone(), slug.to_owned())).cloned().transpose()
    }
}

/// Navigator that records every destination.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: RefCell<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.visited.borrow().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, to: &str) {
        self.visited.borrow_mut().push(to.to_owned());
    }
}
