use super::*;
use crate::test_helpers::{MockBackend, RecordingNavigator, org, project, user};

fn seeded() -> Arc<MockBackend> {
    let backend = MockBackend::new();
    backend.set_user(Some(user("u1", true)));
    backend.add_org(org(1, "acme"));
    backend.add_project("acme", project(10, 1, "web"));
    backend
}

fn shell_with(backend: &Arc<MockBackend>, config: GuardConfig, flags: FeatureFlags) -> Shell<RecordingNavigator> {
    Shell::new(
        Arc::new(SessionStore::new(backend.clone())),
        WorkspaceResolver::new(backend.clone(), flags),
        config,
        flags,
        RecordingNavigator::default(),
    )
}

fn shell(backend: &Arc<MockBackend>) -> Shell<RecordingNavigator> {
    shell_with(backend, GuardConfig::default(), FeatureFlags::default())
}

fn status(view: &View) -> Option<WorkspaceStatus> {
    match view {
        View::Content(Some(ctx)) => Some(ctx.status()),
        _ => None,
    }
}

// =============================================================================
// Guard sequencing
// =============================================================================

#[tokio::test]
async fn render_before_identity_check_is_loading_and_silent() {
    let backend = seeded();
    let mut shell = shell(&backend);

    assert_eq!(shell.render("/orgs/acme/projects/web").await.unwrap(), View::Loading);
    assert!(shell.navigator().visited().is_empty());
    assert_eq!(MockBackend::calls(&backend.organization_calls), 0);
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_sign_in_with_return_path() {
    let backend = MockBackend::new();
    let mut shell = shell(&backend);

    assert_eq!(shell.mount("/projects/demo").await.unwrap(), View::Redirecting);
    assert_eq!(shell.navigator().visited(), vec!["/signin?redirect=%2Fprojects%2Fdemo".to_owned()]);
}

#[tokio::test]
async fn re_rendering_anonymous_session_redirects_once() {
    let backend = MockBackend::new();
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    for _ in 0..3 {
        assert_eq!(shell.render("/orgs/acme").await.unwrap(), View::Redirecting);
    }
    assert_eq!(shell.navigator().visited().len(), 1);
    assert_eq!(MockBackend::calls(&backend.organization_calls), 0);
}

#[tokio::test]
async fn unverified_email_goes_to_verification_when_flagged() {
    let backend = seeded();
    backend.set_user(Some(user("u1", false)));
    let flags = FeatureFlags::default().with(Flag::RequireEmailVerification, true);
    let mut shell = shell_with(&backend, GuardConfig::default(), flags);

    assert_eq!(shell.mount("/orgs/acme").await.unwrap(), View::Redirecting);
    assert_eq!(shell.navigator().visited(), vec!["/verify-email?redirect=%2Forgs%2Facme".to_owned()]);
}

// =============================================================================
// Workspace views
// =============================================================================

#[tokio::test]
async fn authorized_workspace_renders_content() {
    let backend = seeded();
    let mut shell = shell(&backend);

    let view = shell.mount("/orgs/acme/projects/web/settings").await.unwrap();
    let View::Content(Some(ctx)) = view else {
        panic!("expected workspace content, got {view:?}");
    };
    assert_eq!(ctx.organization().map(|o| o.id), Some(1));
    assert_eq!(ctx.project().map(|p| p.id), Some(10));
    assert!(shell.navigator().visited().is_empty());
}

#[tokio::test]
async fn cross_organization_project_renders_not_found() {
    let backend = seeded();
    backend.add_project("acme", project(20, 2, "web"));
    let mut shell = shell(&backend);

    assert_eq!(shell.mount("/orgs/acme/projects/web").await.unwrap(), View::NotFound);
}

#[tokio::test]
async fn transport_failure_renders_error() {
    let backend = seeded();
    backend.fail_org("acme", TransportError::Status { status: 500 });
    let mut shell = shell(&backend);

    assert_eq!(shell.mount("/orgs/acme").await.unwrap(), View::Error(TransportError::Status { status: 500 }));
}

#[tokio::test]
async fn leaving_workspace_tree_clears_context() {
    let backend = seeded();
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    assert_eq!(shell.render("/account").await.unwrap(), View::Content(None));
    assert_eq!(shell.resolver().current(), None);
}

#[tokio::test]
async fn malformed_slug_is_configuration_error() {
    let backend = seeded();
    let mut shell = shell(&backend);

    let err = shell.mount("/orgs/ac%20me").await.unwrap_err();
    assert!(matches!(err, GateError::Configuration(_)), "{err:?}");
}

// =============================================================================
// Session changes
// =============================================================================

#[tokio::test]
async fn same_user_refresh_keeps_workspace() {
    let backend = seeded();
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    shell.store().refresh().await;
    let view = shell.render("/orgs/acme").await.unwrap();
    assert_eq!(status(&view), Some(WorkspaceStatus::Ready));
    assert_eq!(MockBackend::calls(&backend.organization_calls), 1);
}

#[tokio::test]
async fn different_user_invalidates_workspace() {
    let backend = seeded();
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    backend.set_user(Some(user("u2", true)));
    shell.store().refresh().await;
    let view = shell.render("/orgs/acme").await.unwrap();
    assert_eq!(status(&view), Some(WorkspaceStatus::Ready));
    assert_eq!(MockBackend::calls(&backend.organization_calls), 2);
}

#[tokio::test]
async fn rejected_lookup_refreshes_session_and_redirects() {
    let backend = seeded();
    let mut shell = shell(&backend);

    shell.mount("/account").await.unwrap();
    backend.set_user(None);
    backend.fail_org("acme", TransportError::Unauthorized);

    assert_eq!(shell.render("/orgs/acme").await.unwrap(), View::Redirecting);
    assert_eq!(MockBackend::calls(&backend.identity_calls), 2);
    assert_eq!(shell.navigator().visited(), vec!["/signin?redirect=%2Forgs%2Facme".to_owned()]);
}

#[tokio::test]
async fn rejected_lookup_with_valid_session_is_error_after_one_retry() {
    let backend = seeded();
    backend.fail_org("acme", TransportError::Unauthorized);
    let mut shell = shell(&backend);

    assert_eq!(shell.mount("/orgs/acme").await.unwrap(), View::Error(TransportError::Unauthorized));
    assert_eq!(MockBackend::calls(&backend.identity_calls), 2);
    assert_eq!(MockBackend::calls(&backend.organization_calls), 2);
}

#[tokio::test]
async fn expired_session_redirects_with_status_when_flagged() {
    let backend = seeded();
    let flags = FeatureFlags::default().with(Flag::SessionExpiryRedirect, true);
    let mut shell = shell_with(&backend, GuardConfig::default(), flags);

    shell.mount("/orgs/acme").await.unwrap();
    backend.set_user(None);
    shell.store().refresh().await;

    assert_eq!(shell.render("/orgs/acme").await.unwrap(), View::Redirecting);
    assert_eq!(shell.navigator().visited(), vec!["/signin?status=expired".to_owned()]);
    assert_eq!(shell.resolver().current(), None);
}

#[tokio::test]
async fn expired_session_without_flag_uses_guard_redirect() {
    let backend = seeded();
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    backend.set_user(None);
    shell.store().refresh().await;

    assert_eq!(shell.render("/orgs/acme").await.unwrap(), View::Redirecting);
    assert_eq!(shell.navigator().visited(), vec!["/signin?redirect=%2Forgs%2Facme".to_owned()]);
}

#[tokio::test]
async fn session_ending_during_lookup_redirects_instead_of_content() {
    let backend = seeded();
    let mut shell = shell(&backend);
    shell.mount("/account").await.unwrap();
    backend.hold("acme");
    let store = shell.store().clone();

    let (view, ()) = tokio::join!(shell.render("/orgs/acme"), async {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        store.end(SessionEnd::Expired);
        backend.release("acme");
    });

    assert_eq!(view.unwrap(), View::Redirecting);
    assert_eq!(shell.navigator().visited(), vec!["/signin?redirect=%2Forgs%2Facme".to_owned()]);
    let current = shell.resolver().current().unwrap();
    assert_eq!(current.status(), WorkspaceStatus::Loading);
    assert_eq!(current.organization(), None);
}

#[tokio::test]
async fn session_ended_outside_shell_drops_workspace() {
    let backend = seeded();
    let mut shell = shell(&backend);
    shell.mount("/orgs/acme").await.unwrap();

    shell.store().end(SessionEnd::Ended);
    let current = shell.resolver().current().unwrap();
    assert_eq!(current.status(), WorkspaceStatus::Loading);
    assert_eq!(current.organization(), None);

    shell.store().sign_out().await;
    assert_eq!(shell.render("/orgs/acme").await.unwrap(), View::Redirecting);
}

#[tokio::test]
async fn refresh_in_progress_shows_loading_then_restores_workspace() {
    let backend = seeded();
    let mut shell = shell(&backend);
    shell.mount("/orgs/acme").await.unwrap();
    backend.hold("me");
    let store = shell.store().clone();

    let (pending, ()) = tokio::join!(
        async {
            tokio::task::yield_now().await;
            let view = shell.render("/orgs/acme").await.unwrap();
            let published = shell.resolver().current().map(|c| c.status());
            backend.release("me");
            (view, published)
        },
        async {
            store.refresh().await;
        }
    );
    assert_eq!(pending, (View::Loading, Some(WorkspaceStatus::Loading)));

    let view = shell.render("/orgs/acme").await.unwrap();
    assert_eq!(status(&view), Some(WorkspaceStatus::Ready));
    assert_eq!(MockBackend::calls(&backend.organization_calls), 1);
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn sign_out_reports_success_and_clears_workspace() {
    let backend = seeded();
    let config = GuardConfig::default().with_redirect_to("/login");
    let flags = FeatureFlags::default().with(Flag::SessionExpiryRedirect, true);
    let mut shell = shell_with(&backend, config, flags);

    shell.mount("/orgs/acme").await.unwrap();
    assert_eq!(shell.sign_out().await, SessionEnd::LogoutSuccess);
    assert_eq!(shell.navigator().visited(), vec!["/login?status=logout_success".to_owned()]);
    assert_eq!(shell.resolver().current(), None);
    assert_eq!(shell.store().get_session(), Session::anonymous());

    // Signing out is not an expiry.
    shell.render("/orgs/acme").await.unwrap();
    assert!(!shell.navigator().visited().iter().any(|to| to.contains("status=expired")));
}

#[tokio::test]
async fn sign_out_failure_is_reported_to_sign_in_page() {
    let backend = seeded();
    backend.fail_logout(TransportError::Request("offline".into()));
    let mut shell = shell(&backend);

    shell.mount("/orgs/acme").await.unwrap();
    assert_eq!(shell.sign_out().await, SessionEnd::LogoutError);
    assert_eq!(shell.navigator().visited(), vec!["/signin?status=logout_error".to_owned()]);
}
