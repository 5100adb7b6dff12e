//! Unverified JWT claim inspection.
//!
//! The server signs its tokens with keys we never see, so the only thing the
//! client can (and needs to) do is read the `exp` claim to know when to
//! refresh. Signatures are not checked here.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Read the expiry timestamp embedded in a JWT.
pub fn expires_at(token: &str) -> Result<DateTime<Utc>, AuthError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(AuthError::InvalidToken(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {}", e)))?;
    let claims: ExpiryClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not a claims object: {}", e)))?;
    let exp = claims
        .exp
        .ok_or_else(|| AuthError::InvalidToken("missing exp claim".to_string()))?;

    DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| AuthError::InvalidToken(format!("exp claim out of range: {}", exp)))
}
