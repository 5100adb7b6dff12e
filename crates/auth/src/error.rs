use thiserror::Error;

/// Errors raised by the session manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login was rejected or the server could not be reached.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The refresh endpoint rejected the refresh token or could not be reached.
    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),

    /// A token's expiry could not be determined.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing session")]
    MissingSession,

    #[error("Session expired")]
    SessionExpired,

    /// The server returned a session for a different account than the one
    /// this manager is pinned to.
    #[error("Account mismatch: expected {expected}, got {actual}")]
    AccountMismatch { expected: String, actual: String },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

impl AuthError {
    pub fn authentication<T: std::fmt::Display>(msg: T) -> Self {
        AuthError::AuthenticationError(msg.to_string())
    }

    pub fn refresh<T: std::fmt::Display>(msg: T) -> Self {
        AuthError::RefreshFailed(msg.to_string())
    }
}
