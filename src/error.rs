//! Error handling for the botsky client

use std::fmt;
use thiserror::Error;

pub use botsky_auth::AuthError;
pub use botsky_listener::ListenerError;

/// Unified error type for the botsky client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Session errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Handler registration errors
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    /// A non-2xx XRPC response
    #[error("XRPC error ({status}) {error}: {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    /// Malformed `at://` URI
    #[error("Invalid AT URI: {0}")]
    InvalidUri(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new API error
    pub fn api<E: fmt::Display, M: fmt::Display>(status: u16, error: E, message: M) -> Self {
        Error::Api {
            status,
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// The XRPC error name, for API errors.
    pub fn api_error(&self) -> Option<&str> {
        match self {
            Error::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}
