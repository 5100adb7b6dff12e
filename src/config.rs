//! Configuration options for the botsky client

use std::time::Duration;

use botsky_auth::AuthOptions;

pub const DEFAULT_HOST: &str = "https://bsky.social";
pub const DEFAULT_CHAT_PROXY: &str = "did:web:api.bsky.chat#bsky_chat";

/// Configuration options for the botsky client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The PDS or entryway all XRPC calls go to
    pub host: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Value of the `atproto-proxy` header sent with chat calls
    pub chat_proxy: String,

    /// The user agent
    pub user_agent: String,

    /// Session refresh behaviour
    pub auth: AuthOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            chat_proxy: DEFAULT_CHAT_PROXY.to_string(),
            user_agent: format!("botsky/{}", env!("CARGO_PKG_VERSION")),
            auth: AuthOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Set the service host
    pub fn with_host(mut self, value: &str) -> Self {
        self.host = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the chat service proxy
    pub fn with_chat_proxy(mut self, value: &str) -> Self {
        self.chat_proxy = value.to_string();
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, value: &str) -> Self {
        self.user_agent = value.to_string();
        self
    }

    /// Set the session refresh options
    pub fn with_auth_options(mut self, value: AuthOptions) -> Self {
        self.auth = value;
        self
    }
}
