//! Session data

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;
use crate::jwt;

/// Token pair and identity returned by `createSession` / `refreshSession`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub handle: String,
    pub did: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_jwt", &"<redacted>")
            .field("refresh_jwt", &"<redacted>")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .finish()
    }
}

/// The authentication state for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub handle: String,
    pub did: String,

    /// Expiry embedded in the access token.
    pub access_expires_at: DateTime<Utc>,

    /// Expiry embedded in the refresh token, if it could be read.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Build a session from a token pair, reading both expiries.
    ///
    /// Fails if the access token's expiry cannot be determined. An unreadable
    /// refresh token only means the next refresh falls back to a full login.
    pub fn from_tokens(tokens: SessionTokens) -> Result<Self, AuthError> {
        let access_expires_at = jwt::expires_at(&tokens.access_jwt)?;
        let refresh_expires_at = jwt::expires_at(&tokens.refresh_jwt).ok();

        Ok(Self {
            access_jwt: tokens.access_jwt,
            refresh_jwt: tokens.refresh_jwt,
            handle: tokens.handle,
            did: tokens.did,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Time left on the access token, negative once expired.
    pub fn access_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.access_expires_at - now
    }

    /// Time left on the refresh token. `None` when its expiry is unknown.
    pub fn refresh_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.refresh_expires_at.map(|expiry| expiry - now)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_jwt", &"<redacted>")
            .field("refresh_jwt", &"<redacted>")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn mint(exp: i64) -> String {
        let claims = serde_json::json!({ "sub": "did:plc:abc", "exp": exp });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap()
    }

    #[test]
    fn test_tokens_deserialize_from_wire_format() {
        let tokens: SessionTokens = serde_json::from_value(serde_json::json!({
            "accessJwt": "a",
            "refreshJwt": "r",
            "handle": "bot.bsky.social",
            "did": "did:plc:abc",
            "active": true
        }))
        .unwrap();
        assert_eq!(tokens.access_jwt, "a");
        assert_eq!(tokens.refresh_jwt, "r");
        assert_eq!(tokens.did, "did:plc:abc");
    }

    #[test]
    fn test_from_tokens_reads_expiries() {
        let session = Session::from_tokens(SessionTokens {
            access_jwt: mint(2_000),
            refresh_jwt: mint(9_000),
            handle: "bot.bsky.social".to_string(),
            did: "did:plc:abc".to_string(),
        })
        .unwrap();

        let now = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        assert_eq!(session.access_remaining(now).num_seconds(), 1_000);
        assert_eq!(session.refresh_remaining(now).unwrap().num_seconds(), 8_000);
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(session.access_expires_at));
    }

    #[test]
    fn test_unreadable_refresh_token_is_tolerated() {
        let session = Session::from_tokens(SessionTokens {
            access_jwt: mint(2_000),
            refresh_jwt: "opaque".to_string(),
            handle: "bot.bsky.social".to_string(),
            did: "did:plc:abc".to_string(),
        })
        .unwrap();
        assert!(session.refresh_expires_at.is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = SessionTokens {
            access_jwt: "secret-access".to_string(),
            refresh_jwt: "secret-refresh".to_string(),
            handle: "bot.bsky.social".to_string(),
            did: "did:plc:abc".to_string(),
        };
        let printed = format!("{:?}", tokens);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("bot.bsky.social"));
    }
}
