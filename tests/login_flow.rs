//! End-to-end guard flows over the in-memory store: lockout, audit pairing,
//! idle and absolute expiry, and route authorization.

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use nexas_auth::audit::LoginEventFilter;
use nexas_auth::session::{hash_session_token, Session};
use nexas_auth::store::memory::MemoryStore;
use nexas_auth::store::SessionStore;
use nexas_auth::{
    AccessOutcome, Auth, AuthEvent, AuditRecorder, ClientInfo, DenyReason, EventBus,
    EventListener, LoginOutcome, LoginRequest, NewAccount, RejectReason, Role, SessionState,
};

const PASSWORD: &str = "correct-horse-battery";

fn harness() -> (Auth, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let auth = Auth::new(
        store.clone(),
        store.clone(),
        AuditRecorder::new(store.clone()),
    );
    (auth, store)
}

async fn register(auth: &Auth, email: &str, role: Role) -> nexas_auth::Account {
    auth.register(NewAccount {
        email: email.to_string(),
        password: SecretString::from(PASSWORD),
        role,
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone_number: None,
        department: None,
    })
    .await
    .expect("register")
}

fn login_request(email: &str, password: &str, remember_me: bool) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: SecretString::from(password),
        remember_me,
        client: ClientInfo {
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("integration-test".to_string()),
        },
    }
}

#[tokio::test]
async fn fifth_failure_locks_even_correct_password_out() {
    let (auth, _) = harness();
    register(&auth, "locked@example.com", Role::Volunteer).await;

    for _ in 0..5 {
        let outcome = auth
            .authenticate(login_request("locked@example.com", "wrong", false))
            .await
            .expect("authenticate");
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(RejectReason::InvalidCredentials)
        ));
    }

    let outcome = auth
        .authenticate(login_request("locked@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    assert!(matches!(
        outcome,
        LoginOutcome::Rejected(RejectReason::AccountLocked)
    ));
}

#[tokio::test]
async fn success_before_threshold_resets_counter() {
    let (auth, _) = harness();
    register(&auth, "reset@example.com", Role::Volunteer).await;

    for _ in 0..4 {
        auth.authenticate(login_request("reset@example.com", "wrong", false))
            .await
            .expect("authenticate");
    }
    let outcome = auth
        .authenticate(login_request("reset@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    assert!(matches!(outcome, LoginOutcome::Accepted { .. }));

    // The counter restarted: four more failures still do not lock.
    for _ in 0..4 {
        auth.authenticate(login_request("reset@example.com", "wrong", false))
            .await
            .expect("authenticate");
    }
    let outcome = auth
        .authenticate(login_request("reset@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    assert!(matches!(outcome, LoginOutcome::Accepted { .. }));
}

#[tokio::test]
async fn login_logout_pairs_one_audit_record() {
    let (auth, _) = harness();
    let account = register(&auth, "pair@example.com", Role::Donation).await;

    let outcome = auth
        .authenticate(login_request("pair@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    let LoginOutcome::Accepted { token, .. } = outcome else {
        panic!("expected accepted login");
    };

    auth.logout(&token).await.expect("logout");
    // Idempotent: a second logout with the same token is still Ok.
    auth.logout(&token).await.expect("second logout");

    let events = auth
        .audit()
        .login_events(&LoginEventFilter {
            account_id: Some(account.id),
            success: Some(true),
            ..LoginEventFilter::default()
        })
        .await
        .expect("login_events");
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(event.session_id.is_some());
    assert_eq!(event.ip_address.as_deref(), Some("203.0.113.7"));
    let logout_at = event.logout_at.expect("logout recorded");
    assert!(logout_at >= event.login_at);
}

#[tokio::test]
async fn failed_attempts_leave_audit_records() {
    let (auth, _) = harness();
    register(&auth, "fail@example.com", Role::Volunteer).await;

    auth.authenticate(login_request("fail@example.com", "wrong", false))
        .await
        .expect("authenticate");
    auth.authenticate(login_request("ghost@example.com", "wrong", false))
        .await
        .expect("authenticate");

    let failures = auth
        .audit()
        .login_events(&LoginEventFilter {
            success: Some(false),
            ..LoginEventFilter::default()
        })
        .await
        .expect("login_events");
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().any(|event| event.account_id.is_some()));
    assert!(failures.iter().any(|event| event.account_id.is_none()));
    assert!(failures
        .iter()
        .all(|event| event.failure_reason.as_deref() == Some("invalid credentials")));
}

#[tokio::test]
async fn idle_session_expires_before_authorization() {
    let (auth, store) = harness();
    let account = register(&auth, "idle@example.com", Role::Volunteer).await;

    let now = Utc::now();
    let token = "stale-token";
    store
        .insert(Session {
            id: Uuid::new_v4(),
            token_hash: hash_session_token(token),
            account_id: account.id,
            remember_me: false,
            created_at: now - Duration::hours(3),
            expires_at: now + Duration::hours(9),
            last_activity: Some(now - Duration::hours(3)),
        })
        .await
        .expect("insert session");

    // Expiry is reported as such, never as a permission denial.
    let outcome = auth
        .check_path(Some(token), "/dashboard/volunteer/")
        .await
        .expect("check_path");
    assert_eq!(outcome, AccessOutcome::SessionExpired);

    // The session is gone; the next request sees no session at all.
    assert_eq!(
        auth.resolve(token).await.expect("resolve"),
        SessionState::Missing
    );
}

#[tokio::test]
async fn absolute_expiry_enforced() {
    let (auth, store) = harness();
    let account = register(&auth, "old@example.com", Role::Volunteer).await;

    let now = Utc::now();
    let token = "ancient-token";
    store
        .insert(Session {
            id: Uuid::new_v4(),
            token_hash: hash_session_token(token),
            account_id: account.id,
            remember_me: false,
            created_at: now - Duration::hours(13),
            expires_at: now - Duration::hours(1),
            // Active recently, but the absolute lifetime is up.
            last_activity: Some(now - Duration::minutes(5)),
        })
        .await
        .expect("insert session");

    assert_eq!(
        auth.resolve(token).await.expect("resolve"),
        SessionState::Expired
    );
}

#[tokio::test]
async fn active_session_slides_idle_clock() {
    let (auth, store) = harness();
    let account = register(&auth, "sliding@example.com", Role::Volunteer).await;

    let now = Utc::now();
    let token = "fresh-token";
    let token_hash = hash_session_token(token);
    store
        .insert(Session {
            id: Uuid::new_v4(),
            token_hash: token_hash.clone(),
            account_id: account.id,
            remember_me: false,
            created_at: now - Duration::hours(1),
            expires_at: now + Duration::hours(11),
            last_activity: Some(now - Duration::minutes(90)),
        })
        .await
        .expect("insert session");

    assert!(matches!(
        auth.resolve(token).await.expect("resolve"),
        SessionState::Active(_)
    ));
    let session = store
        .find(&token_hash)
        .await
        .expect("find")
        .expect("session still present");
    let last = session.last_activity.expect("activity stamped");
    assert!(now - last < Duration::seconds(5));
}

#[tokio::test]
async fn remember_me_extends_session_lifetime() {
    let (auth, _) = harness();
    register(&auth, "remember@example.com", Role::Volunteer).await;

    let short = auth
        .authenticate(login_request("remember@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    let long = auth
        .authenticate(login_request("remember@example.com", PASSWORD, true))
        .await
        .expect("authenticate");

    let (LoginOutcome::Accepted { expires_at: short_expiry, .. },
         LoginOutcome::Accepted { expires_at: long_expiry, .. }) = (short, long)
    else {
        panic!("expected two accepted logins");
    };
    assert!(long_expiry - short_expiry > Duration::days(13));
}

#[tokio::test]
async fn route_authorization_after_session_resolution() {
    let (auth, _) = harness();
    register(&auth, "vol@example.com", Role::Volunteer).await;

    let outcome = auth
        .authenticate(login_request("vol@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    let LoginOutcome::Accepted { token, dashboard, .. } = outcome else {
        panic!("expected accepted login");
    };
    assert_eq!(dashboard, "/dashboard/volunteer/");

    // Own dashboard and unclassified paths pass; admin surfaces and foreign
    // dashboards are denied with distinct reasons.
    assert!(matches!(
        auth.check_path(Some(&token), "/dashboard/volunteer/tasks/")
            .await
            .expect("check_path"),
        AccessOutcome::Granted(Some(_))
    ));
    assert!(matches!(
        auth.check_path(Some(&token), "/campaigns/list/")
            .await
            .expect("check_path"),
        AccessOutcome::Granted(Some(_))
    ));
    assert_eq!(
        auth.check_path(Some(&token), "/accounts/users/")
            .await
            .expect("check_path"),
        AccessOutcome::Denied(DenyReason::InsufficientRole)
    );
    assert_eq!(
        auth.check_path(Some(&token), "/dashboard/admin/")
            .await
            .expect("check_path"),
        AccessOutcome::Denied(DenyReason::WrongDashboard)
    );

    // Public paths need no session; everything else does.
    assert_eq!(
        auth.check_path(None, "/accounts/login/")
            .await
            .expect("check_path"),
        AccessOutcome::Granted(None)
    );
    assert_eq!(
        auth.check_path(None, "/dashboard/volunteer/")
            .await
            .expect("check_path"),
        AccessOutcome::Denied(DenyReason::NotAuthenticated)
    );
}

#[derive(Default)]
struct EventNames {
    seen: Mutex<Vec<&'static str>>,
}

impl EventListener for EventNames {
    fn handle(&self, event: &AuthEvent) {
        let name = match event {
            AuthEvent::AccountCreated { .. } => "created",
            AuthEvent::LoginSucceeded { .. } => "login",
            AuthEvent::LoginFailed { .. } => "failed",
            AuthEvent::LoggedOut { .. } => "logout",
            AuthEvent::SessionExpired { .. } => "expired",
        };
        self.seen.lock().expect("listener lock").push(name);
    }
}

#[tokio::test]
async fn lifecycle_events_reach_listeners() {
    let store = Arc::new(MemoryStore::new());
    let listener = Arc::new(EventNames::default());
    let auth = Auth::new(
        store.clone(),
        store.clone(),
        AuditRecorder::new(store),
    )
    .with_events(EventBus::new().with_listener(listener.clone()));

    register(&auth, "events@example.com", Role::Volunteer).await;
    auth.authenticate(login_request("events@example.com", "wrong", false))
        .await
        .expect("authenticate");
    let outcome = auth
        .authenticate(login_request("events@example.com", PASSWORD, false))
        .await
        .expect("authenticate");
    let LoginOutcome::Accepted { token, .. } = outcome else {
        panic!("expected accepted login");
    };
    auth.logout(&token).await.expect("logout");

    assert_eq!(
        *listener.seen.lock().expect("listener lock"),
        vec!["created", "failed", "login", "logout"]
    );
}
