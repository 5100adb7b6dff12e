use async_trait::async_trait;
use botsky_auth::{
    AuthError, AuthManager, AuthOptions, AuthState, Clock, Credentials, RefreshOutcome,
    SessionApi, SessionTokens,
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const BOT_DID: &str = "did:plc:testbot";

/// Wall clock that follows tokio's (pausable) clock.
struct TestClock {
    base: DateTime<Utc>,
    start: Instant,
}

impl TestClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            start: Instant::now(),
        })
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Create,
    Refresh,
}

#[derive(Debug)]
struct ApiCall {
    kind: CallKind,
    at: Instant,
}

struct FakeApi {
    clock: Arc<TestClock>,
    did: Mutex<String>,
    access_ttl: AtomicI64,
    refresh_ttl: AtomicI64,
    refresh_delay: Mutex<Duration>,
    fail_create: AtomicBool,
    fail_refresh: AtomicBool,
    serial: AtomicUsize,
    create_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_issued: Mutex<Option<String>>,
    events: mpsc::UnboundedSender<ApiCall>,
}

impl FakeApi {
    fn new(
        clock: Arc<TestClock>,
        access_ttl: i64,
        refresh_ttl: i64,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ApiCall>) {
        let (events, rx) = mpsc::unbounded_channel();
        let api = Arc::new(Self {
            clock,
            did: Mutex::new(BOT_DID.to_string()),
            access_ttl: AtomicI64::new(access_ttl),
            refresh_ttl: AtomicI64::new(refresh_ttl),
            refresh_delay: Mutex::new(Duration::ZERO),
            fail_create: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            serial: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            last_issued: Mutex::new(None),
            events,
        });
        (api, rx)
    }

    fn mint(&self, kind: &str, ttl: i64) -> String {
        let n = self.serial.fetch_add(1, Ordering::SeqCst);
        let exp = (self.clock.now() + chrono::Duration::seconds(ttl)).timestamp();
        let claims = json!({
            "sub": self.did.lock().unwrap().clone(),
            "exp": exp,
            "jti": format!("{}-{}", kind, n),
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
    }

    fn issue(&self) -> SessionTokens {
        let access_jwt = self.mint("access", self.access_ttl.load(Ordering::SeqCst));
        let refresh_jwt = self.mint("refresh", self.refresh_ttl.load(Ordering::SeqCst));
        *self.last_issued.lock().unwrap() = Some(access_jwt.clone());
        SessionTokens {
            access_jwt,
            refresh_jwt,
            handle: "testbot.bsky.social".to_string(),
            did: self.did.lock().unwrap().clone(),
        }
    }

    fn last_issued(&self) -> Option<String> {
        self.last_issued.lock().unwrap().clone()
    }

    fn record(&self, kind: CallKind) {
        let _ = self.events.send(ApiCall {
            kind,
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl SessionApi for FakeApi {
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthError> {
        assert_eq!(identifier, "testbot.bsky.social");
        assert_eq!(password, "app-password");
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.record(CallKind::Create);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AuthError::authentication("Invalid identifier or password"));
        }
        Ok(self.issue())
    }

    async fn refresh_session(&self, _refresh_jwt: &str) -> Result<SessionTokens, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.record(CallKind::Refresh);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::refresh("ExpiredToken"));
        }
        Ok(self.issue())
    }
}

fn credentials() -> Credentials {
    Credentials::new("testbot.bsky.social", "app-password")
}

fn manager(api: &Arc<FakeApi>, clock: &Arc<TestClock>, options: AuthOptions) -> AuthManager {
    AuthManager::new_with_clock(credentials(), api.clone(), options, clock.clone())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_fires_at_expiry_minus_margin() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 90, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());

    let start = Instant::now();
    let original = auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);
    assert_eq!(auth.state(), AuthState::Authenticated);

    let refresh = calls.recv().await.unwrap();
    assert_eq!(refresh.kind, CallKind::Refresh);
    let elapsed = refresh.at - start;
    assert!(
        elapsed >= Duration::from_secs(59) && elapsed <= Duration::from_secs(61),
        "refresh fired after {:?}",
        elapsed
    );

    wait_until(|| auth.session().map(|s| s.access_jwt) != Some(original.access_jwt.clone()))
        .await;
    let refreshed = auth.session().unwrap();
    assert_ne!(refreshed.access_jwt, original.access_jwt);
    assert_eq!(Some(refreshed.access_jwt), api.last_issued());
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_cycle_keeps_rescheduling() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 90, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    let first = calls.recv().await.unwrap();
    let second = calls.recv().await.unwrap();
    assert_eq!(first.kind, CallKind::Refresh);
    assert_eq!(second.kind, CallKind::Refresh);
    let gap = second.at - first.at;
    assert!(gap >= Duration::from_secs(59) && gap <= Duration::from_secs(61));
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_is_never_exposed() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 90, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));

    let session = auth.authenticate().await.unwrap();
    assert_eq!(auth.access_token().unwrap(), session.access_jwt);

    tokio::time::advance(Duration::from_secs(91)).await;
    assert!(auth.session().is_none());
    assert_eq!(auth.access_token(), Err(AuthError::SessionExpired));
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_are_serialized() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();

    api.access_ttl.store(3600, Ordering::SeqCst);
    *api.refresh_delay.lock().unwrap() = Duration::from_secs(5);

    let first = tokio::spawn({
        let auth = auth.clone();
        async move { auth.refresh_session().await }
    });
    let second = tokio::spawn({
        let auth = auth.clone();
        async move { auth.refresh_session().await }
    });

    let mut outcomes = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    outcomes.sort_by_key(|outcome| *outcome == RefreshOutcome::Skipped);
    assert_eq!(outcomes, vec![RefreshOutcome::Refreshed, RefreshOutcome::Skipped]);

    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(auth.session().map(|s| s.access_jwt), api.last_issued());
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_due_refreshes_never_overlap() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();

    // every refreshed token is immediately due again, so both callers refresh
    *api.refresh_delay.lock().unwrap() = Duration::from_secs(2);
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let auth = auth.clone();
            tokio::spawn(async move { auth.refresh_session().await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), RefreshOutcome::Refreshed);
    }

    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 3);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(auth.session().map(|s| s.access_jwt), api.last_issued());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_timer_does_not_refresh() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 40, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());

    let start = Instant::now();
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    // version N+1 installed before version N's timer (t=10s) fires
    api.access_ttl.store(45, Ordering::SeqCst);
    let newer = api.issue();
    auth.update_auth(newer.clone()).unwrap();

    let refresh = calls.recv().await.unwrap();
    assert_eq!(refresh.kind, CallKind::Refresh);
    let elapsed = refresh.at - start;
    assert!(elapsed >= Duration::from_secs(14) && elapsed <= Duration::from_secs(16));

    wait_until(|| auth.session().map(|s| s.access_jwt) != Some(newer.access_jwt.clone())).await;
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(auth.session().map(|s| s.access_jwt), api.last_issued());
}

#[tokio::test(start_paused = true)]
async fn test_timer_for_replaced_session_skips_under_lock() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 40, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());

    let start = Instant::now();
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    // timer N fires at t=10s and holds the refresh lock until t=30s
    *api.refresh_delay.lock().unwrap() = Duration::from_secs(20);
    let refresh = calls.recv().await.unwrap();
    assert_eq!(refresh.kind, CallKind::Refresh);

    // session X is due at t=16s, while N's refresh is still running
    api.access_ttl.store(36, Ordering::SeqCst);
    let replaced = api.issue();
    auth.update_auth(replaced.clone()).unwrap();
    api.access_ttl.store(3600, Ordering::SeqCst);
    *api.refresh_delay.lock().unwrap() = Duration::ZERO;

    tokio::time::sleep_until(start + Duration::from_secs(17)).await;
    assert_eq!(auth.state(), AuthState::Refreshing);

    tokio::time::sleep_until(start + Duration::from_secs(31)).await;
    assert_eq!(auth.state(), AuthState::Authenticated);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(calls.try_recv().is_err(), "timer X must not refresh again");
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    let current = auth.session().unwrap();
    assert_ne!(current.access_jwt, replaced.access_jwt);
    assert_eq!(Some(current.access_jwt), api.last_issued());
}

#[tokio::test(start_paused = true)]
async fn test_token_inside_margin_is_not_refreshed_in_a_hot_loop() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());

    let start = Instant::now();
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    let first = calls.recv().await.unwrap();
    let second = calls.recv().await.unwrap();
    assert_eq!(first.kind, CallKind::Refresh);
    assert_eq!(second.kind, CallKind::Refresh);

    let elapsed = first.at - start;
    assert!(
        elapsed >= Duration::from_millis(4_900) && elapsed <= Duration::from_millis(5_100),
        "first refresh after {:?}",
        elapsed
    );
    let gap = second.at - first.at;
    assert!(
        gap >= Duration::from_millis(4_900) && gap <= Duration::from_millis(5_100),
        "refresh gap {:?}",
        gap
    );
}

#[tokio::test(start_paused = true)]
async fn test_authenticate_waits_for_background_refresh() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 40, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());

    let start = Instant::now();
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    api.access_ttl.store(3600, Ordering::SeqCst);
    *api.refresh_delay.lock().unwrap() = Duration::from_secs(20);
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Refresh);

    let login = auth.authenticate().await.unwrap();
    let create = calls.recv().await.unwrap();
    assert_eq!(create.kind, CallKind::Create);
    assert!(create.at - start >= Duration::from_secs(30));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(auth.session().unwrap().access_jwt, login.access_jwt);
    assert_eq!(Some(login.access_jwt), api.last_issued());
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_of_fresh_session_is_skipped() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 3600, 7200);
    let auth = manager(&api, &clock, AuthOptions::default());
    let session = auth.authenticate().await.unwrap();

    assert_eq!(auth.refresh_session().await.unwrap(), RefreshOutcome::Skipped);
    assert_eq!(auth.refresh_session().await.unwrap(), RefreshOutcome::Skipped);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(auth.session().unwrap().access_jwt, session.access_jwt);
}

#[tokio::test(start_paused = true)]
async fn test_short_lived_refresh_token_triggers_full_login() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 20);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();

    api.access_ttl.store(3600, Ordering::SeqCst);
    assert_eq!(
        auth.refresh_session().await.unwrap(),
        RefreshOutcome::Reauthenticated
    );
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_refresh_token_triggers_full_login() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));

    let mut tokens = api.issue();
    tokens.refresh_jwt = "opaque-refresh-token".to_string();
    auth.update_auth(tokens).unwrap();

    assert_eq!(
        auth.refresh_session().await.unwrap(),
        RefreshOutcome::Reauthenticated
    );
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_falls_back_to_login() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();

    api.fail_refresh.store(true, Ordering::SeqCst);
    assert_eq!(
        auth.refresh_session().await.unwrap(),
        RefreshOutcome::Reauthenticated
    );
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(auth.session().map(|s| s.access_jwt), api.last_issued());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_and_login_failure_leaves_unauthenticated() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();

    api.fail_refresh.store(true, Ordering::SeqCst);
    api.fail_create.store(true, Ordering::SeqCst);
    let err = auth.refresh_session().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationError(_)));
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert_eq!(auth.access_token(), Err(AuthError::MissingSession));
}

#[tokio::test(start_paused = true)]
async fn test_background_failure_ends_unauthenticated() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 40, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    api.fail_refresh.store(true, Ordering::SeqCst);
    api.fail_create.store(true, Ordering::SeqCst);
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Refresh);
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    wait_until(|| auth.state() == AuthState::Unauthenticated).await;
    assert!(auth.session().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_state_reports_refreshing() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 20, 3600);
    let auth = manager(&api, &clock, AuthOptions::default().with_auto_refresh(false));
    auth.authenticate().await.unwrap();
    *api.refresh_delay.lock().unwrap() = Duration::from_secs(5);

    let handle = tokio::spawn({
        let auth = auth.clone();
        async move { auth.refresh_session().await }
    });
    tokio::task::yield_now().await;
    assert_eq!(auth.state(), AuthState::Refreshing);

    handle.await.unwrap().unwrap();
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_failed_authenticate_discards_previous_session() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 3600, 7200);
    let auth = manager(&api, &clock, AuthOptions::default());
    auth.authenticate().await.unwrap();

    api.fail_create.store(true, Ordering::SeqCst);
    let err = auth.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthenticationError(_)));
    assert!(auth.session().is_none());
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_access_token_is_rejected() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 3600, 7200);
    let auth = manager(&api, &clock, AuthOptions::default());

    let err = auth
        .update_auth(SessionTokens {
            access_jwt: "garbage".to_string(),
            refresh_jwt: "garbage".to_string(),
            handle: "testbot.bsky.social".to_string(),
            did: BOT_DID.to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
    assert!(auth.session().is_none());
    assert!(auth.did().is_none());

    tokio::time::advance(Duration::from_secs(7200)).await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_account_is_pinned_by_first_session() {
    let clock = TestClock::new();
    let (api, _calls) = FakeApi::new(clock.clone(), 3600, 7200);
    let auth = manager(&api, &clock, AuthOptions::default());
    auth.authenticate().await.unwrap();
    assert_eq!(auth.did().as_deref(), Some(BOT_DID));
    assert_eq!(auth.handle().as_deref(), Some("testbot.bsky.social"));

    *api.did.lock().unwrap() = "did:plc:someoneelse".to_string();
    let err = auth.update_auth(api.issue()).unwrap_err();
    assert!(matches!(err, AuthError::AccountMismatch { .. }));
    assert_eq!(auth.session().unwrap().did, BOT_DID);
}

#[test]
fn test_refresh_without_session() {
    tokio_test::block_on(async {
        let clock = TestClock::new();
        let (api, _calls) = FakeApi::new(clock.clone(), 3600, 7200);
        let auth = manager(&api, &clock, AuthOptions::default());
        assert_eq!(auth.refresh_session().await, Err(AuthError::MissingSession));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    });
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_stops_refresh_cycle() {
    let clock = TestClock::new();
    let (api, mut calls) = FakeApi::new(clock.clone(), 40, 3600);
    let auth = manager(&api, &clock, AuthOptions::default());
    auth.authenticate().await.unwrap();
    assert_eq!(calls.recv().await.unwrap().kind, CallKind::Create);

    drop(auth);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(calls.try_recv().is_err());
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}
