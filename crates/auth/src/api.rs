use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AuthError;
use crate::session::SessionTokens;

/// Remote login and refresh calls consumed by the session manager.
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Exchange an identifier and app password for a fresh token pair.
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthError>;

    /// Exchange a refresh token for a fresh token pair.
    async fn refresh_session(&self, refresh_jwt: &str) -> Result<SessionTokens, AuthError>;
}

/// Source of the current wall-clock time used for expiry arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
