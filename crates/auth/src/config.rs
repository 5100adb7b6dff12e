//! Credentials and refresh tuning

use std::fmt;
use std::time::Duration;

use crate::error::AuthError;

pub const HANDLE_ENV: &str = "BOTSKY_HANDLE";
pub const APPKEY_ENV: &str = "BOTSKY_APPKEY";

/// Account identifier and app password used for full logins.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }

    /// Read credentials from `BOTSKY_HANDLE` and `BOTSKY_APPKEY`.
    pub fn from_env() -> Result<Self, AuthError> {
        let identifier = std::env::var(HANDLE_ENV).unwrap_or_default();
        let password = std::env::var(APPKEY_ENV).unwrap_or_default();
        Self::from_values(identifier, password)
    }

    fn from_values(identifier: String, password: String) -> Result<Self, AuthError> {
        let identifier = identifier.trim().trim_start_matches('@').to_string();
        let password = password.trim().to_string();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials(format!(
                "{} or {} env variable not set",
                HANDLE_ENV, APPKEY_ENV
            )));
        }
        Ok(Self::new(identifier, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Refresh behaviour of the session manager
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// How long before access token expiry the refresh fires.
    pub refresh_margin: Duration,

    /// Minimum remaining refresh token validity for a token exchange; below
    /// this a full login is performed instead.
    pub min_refresh_validity: Duration,

    /// Shortest delay before a scheduled refresh, applied when the access
    /// token is already inside `refresh_margin`.
    pub min_refresh_delay: Duration,

    /// Schedule background refreshes when a session is installed.
    pub auto_refresh: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(30),
            min_refresh_validity: Duration::from_secs(30),
            min_refresh_delay: Duration::from_secs(5),
            auto_refresh: true,
        }
    }
}

impl AuthOptions {
    pub fn with_refresh_margin(mut self, value: Duration) -> Self {
        self.refresh_margin = value;
        self
    }

    pub fn with_min_refresh_validity(mut self, value: Duration) -> Self {
        self.min_refresh_validity = value;
        self
    }

    pub fn with_min_refresh_delay(mut self, value: Duration) -> Self {
        self.min_refresh_delay = value;
        self
    }

    pub fn with_auto_refresh(mut self, value: bool) -> Self {
        self.auto_refresh = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_trim_and_strip_at() {
        let creds =
            Credentials::from_values(" @bot.bsky.social\n".to_string(), "abcd-efgh ".to_string())
                .unwrap();
        assert_eq!(creds.identifier, "bot.bsky.social");
        assert_eq!(creds.password, "abcd-efgh");
    }

    #[test]
    fn test_missing_credentials() {
        let err = Credentials::from_values(String::new(), "pw".to_string()).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(_)));
        assert!(Credentials::from_values("bot".to_string(), "  ".to_string()).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("bot.bsky.social", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_options_builder() {
        let options = AuthOptions::default()
            .with_refresh_margin(Duration::from_secs(60))
            .with_auto_refresh(false);
        assert_eq!(options.refresh_margin, Duration::from_secs(60));
        assert_eq!(options.min_refresh_validity, Duration::from_secs(30));
        assert_eq!(options.min_refresh_delay, Duration::from_secs(5));
        assert!(!options.auto_refresh);
    }
}
