//! Session ownership and background refresh.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::{Clock, SessionApi, SystemClock};
use crate::config::{AuthOptions, Credentials};
use crate::error::AuthError;
use crate::session::{Session, SessionTokens};

/// Where the manager currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

/// What a refresh attempt ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh token was exchanged for a new pair.
    Refreshed,
    /// A full login replaced the session.
    Reauthenticated,
    /// The live session did not need refreshing.
    Skipped,
}

/// The current session together with the timer scheduled for it. Both are
/// swapped under one lock so a timer never outlives the session it belongs to
/// without being cancelled.
#[derive(Default)]
struct AuthSlot {
    session: Option<Session>,
    timer: Option<CancellationToken>,
}

struct AuthInner {
    credentials: Credentials,
    api: Arc<dyn SessionApi>,
    clock: Arc<dyn Clock>,
    options: AuthOptions,
    slot: RwLock<AuthSlot>,
    // pinned by the first installed session
    account: OnceLock<String>,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
}

impl Drop for AuthInner {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
    }
}

/// Owns the session for one account and keeps it fresh.
///
/// Cloning is cheap and every clone shares the same session. Installing a
/// session schedules a background refresh at `expiry - refresh_margin`;
/// refreshes are serialized by a lock and always re-read the live session
/// before acting.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<AuthInner>,
}

impl AuthManager {
    pub fn new(credentials: Credentials, api: Arc<dyn SessionApi>, options: AuthOptions) -> Self {
        Self::new_with_clock(credentials, api, options, Arc::new(SystemClock))
    }

    pub fn new_with_clock(
        credentials: Credentials,
        api: Arc<dyn SessionApi>,
        options: AuthOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                credentials,
                api,
                clock,
                options,
                slot: RwLock::new(AuthSlot::default()),
                account: OnceLock::new(),
                refresh_lock: Mutex::new(()),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, AuthSlot> {
        self.inner.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, AuthSlot> {
        self.inner.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current session, or `None` if there is none or its access token
    /// has expired.
    pub fn session(&self) -> Option<Session> {
        let now = self.inner.clock.now();
        self.read_slot()
            .session
            .as_ref()
            .filter(|session| !session.is_expired_at(now))
            .cloned()
    }

    /// Bearer token for an outbound call.
    pub fn access_token(&self) -> Result<String, AuthError> {
        let now = self.inner.clock.now();
        match self.read_slot().session.as_ref() {
            None => Err(AuthError::MissingSession),
            Some(session) if session.is_expired_at(now) => Err(AuthError::SessionExpired),
            Some(session) => Ok(session.access_jwt.clone()),
        }
    }

    pub fn state(&self) -> AuthState {
        if self.inner.refreshing.load(Ordering::SeqCst) {
            AuthState::Refreshing
        } else if self.session().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    /// Account DID, fixed by the first session installed.
    pub fn did(&self) -> Option<String> {
        self.inner.account.get().cloned()
    }

    pub fn handle(&self) -> Option<String> {
        self.read_slot()
            .session
            .as_ref()
            .map(|session| session.handle.clone())
    }

    /// Drop the current session and cancel its pending refresh.
    pub fn reset(&self) {
        let mut slot = self.write_slot();
        slot.session = None;
        if let Some(timer) = slot.timer.take() {
            timer.cancel();
        }
    }

    /// Log in with the configured credentials and install the new session.
    ///
    /// Any existing session is discarded first, so a failed login leaves the
    /// manager unauthenticated rather than holding on to a stale token. Waits
    /// for a refresh in progress to finish, so the login always wins.
    pub async fn authenticate(&self) -> Result<Session, AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.login().await
    }

    // caller holds refresh_lock
    async fn login(&self) -> Result<Session, AuthError> {
        self.reset();

        let credentials = &self.inner.credentials;
        info!("Creating session for {}", credentials.identifier);
        let tokens = self
            .inner
            .api
            .create_session(&credentials.identifier, &credentials.password)
            .await
            .map_err(|e| {
                error!("Session creation failed: {}", e);
                match e {
                    AuthError::AuthenticationError(_) => e,
                    other => AuthError::authentication(other),
                }
            })?;

        self.update_auth(tokens)
    }

    /// Install a token pair as the current session and schedule its refresh.
    ///
    /// Fails with [`AuthError::InvalidToken`] when the access token's expiry
    /// cannot be read; nothing is installed or scheduled in that case.
    ///
    /// This does not wait for a background refresh. If one is in flight, the
    /// session it obtains replaces the one installed here when it completes;
    /// use [`AuthManager::authenticate`] when that matters.
    pub fn update_auth(&self, tokens: SessionTokens) -> Result<Session, AuthError> {
        let session = Session::from_tokens(tokens).map_err(|e| {
            error!("Cannot determine access token expiry: {}", e);
            e
        })?;

        let pinned = self.inner.account.get_or_init(|| session.did.clone());
        if *pinned != session.did {
            return Err(AuthError::AccountMismatch {
                expected: pinned.clone(),
                actual: session.did,
            });
        }

        let now = self.inner.clock.now();
        let remaining = session.access_remaining(now);
        let until_due = (remaining - to_chrono(self.inner.options.refresh_margin))
            .to_std()
            .unwrap_or(Duration::ZERO);
        if until_due.is_zero() {
            warn!(
                "Access token for {} is already within the refresh margin ({}s left)",
                session.did,
                remaining.num_seconds()
            );
        }
        let delay = until_due.max(self.inner.options.min_refresh_delay);

        let timer = CancellationToken::new();
        {
            let mut slot = self.write_slot();
            slot.session = Some(session.clone());
            if let Some(previous) = slot.timer.replace(timer.clone()) {
                previous.cancel();
            }
        }

        info!(
            "Session installed for {} ({}), access token valid for {}s",
            session.handle,
            session.did,
            remaining.num_seconds()
        );

        if self.inner.options.auto_refresh {
            self.schedule_refresh(session.access_jwt.clone(), delay, timer);
        }

        Ok(session)
    }

    fn schedule_refresh(&self, scheduled_for: String, delay: Duration, timer: CancellationToken) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime available, automatic session refresh disabled");
                return;
            }
        };

        debug!("Session refresh scheduled in {:?}", delay);
        let manager = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {
                    debug!("Refresh timer superseded");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(inner) = manager.upgrade() else {
                return;
            };
            let manager = AuthManager { inner };
            if let Err(e) = manager.refresh(Some(&scheduled_for)).await {
                error!("Background session refresh failed: {}", e);
            }
        });
    }

    /// Refresh the session now if its access token is within the refresh
    /// margin. A fresh session is left alone.
    pub async fn refresh_session(&self) -> Result<RefreshOutcome, AuthError> {
        self.refresh(None).await
    }

    async fn refresh(&self, scheduled_for: Option<&str>) -> Result<RefreshOutcome, AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let _refreshing = RefreshingFlag::raise(&self.inner.refreshing);

        let current = self.read_slot().session.clone();
        let current = match (current, scheduled_for) {
            (Some(session), _) => session,
            (None, Some(_)) => {
                debug!("Session was reset before its scheduled refresh");
                return Ok(RefreshOutcome::Skipped);
            }
            (None, None) => return Err(AuthError::MissingSession),
        };

        let now = self.inner.clock.now();
        match scheduled_for {
            Some(token) if token != current.access_jwt => {
                debug!("Session superseded since refresh was scheduled");
                return Ok(RefreshOutcome::Skipped);
            }
            Some(_) => {}
            None => {
                if current.access_remaining(now) > to_chrono(self.inner.options.refresh_margin) {
                    debug!("Access token still fresh, skipping refresh");
                    return Ok(RefreshOutcome::Skipped);
                }
            }
        }

        let refresh_usable = current
            .refresh_remaining(now)
            .map(|remaining| remaining > to_chrono(self.inner.options.min_refresh_validity))
            .unwrap_or(false);

        if refresh_usable {
            match self.inner.api.refresh_session(&current.refresh_jwt).await {
                Ok(tokens) => match self.update_auth(tokens) {
                    Ok(_) => {
                        info!("Session refreshed for {}", current.did);
                        return Ok(RefreshOutcome::Refreshed);
                    }
                    Err(e) => warn!("Refreshed session could not be installed: {}", e),
                },
                Err(e) => warn!(
                    "Session refresh failed, falling back to full authentication: {}",
                    e
                ),
            }
        } else {
            info!("Refresh token expired or about to expire, re-authenticating");
        }

        self.login()
            .await
            .map(|_| RefreshOutcome::Reauthenticated)
    }
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("identifier", &self.inner.credentials.identifier)
            .field("state", &self.state())
            .field("options", &self.inner.options)
            .finish()
    }
}

struct RefreshingFlag<'a>(&'a AtomicBool);

impl<'a> RefreshingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
