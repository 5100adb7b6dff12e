//! Botsky
//!
//! A framework for Bluesky bots: an XRPC client whose session refreshes
//! itself in the background, thin wrappers for the notification, chat and repo
//! endpoints, and polling listeners that hand new notifications or chat
//! messages to registered handlers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use botsky::{listeners, Client};
//!
//! # async fn run() -> Result<(), botsky::error::Error> {
//! let client = Arc::new(Client::from_env()?);
//! client.authenticate().await?;
//!
//! let listener = listeners::notification_listener(client);
//! listener.register_handler("replyToMentions", listeners::reply_to_mentions)?;
//! listener.start();
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod fetch;
pub mod listeners;
pub mod notification;
pub mod repo;
pub mod session_api;

use std::fmt;

use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

pub use botsky_auth::{
    AuthError, AuthManager, AuthOptions, AuthState, Credentials, RefreshOutcome, Session,
    SessionTokens,
};
pub use botsky_listener::{
    DispatchContext, EventHandler, Listener, PollContext, PollError, PollSource,
};

use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::session_api::XrpcSessionApi;

const CHAT_PROXY_HEADER: &str = "atproto-proxy";

/// `{host}/xrpc/{nsid}`
pub(crate) fn xrpc_url(host: &Url, nsid: &str) -> Result<Url, url::ParseError> {
    host.join(&format!("xrpc/{}", nsid))
}

fn parse_host(host: &str) -> Result<Url, Error> {
    let mut url = Url::parse(host)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// The main entry point: one authenticated account on one service host.
///
/// Cloning is cheap; clones share the HTTP connection pool and the session.
#[derive(Clone)]
pub struct Client {
    http_client: HttpClient,
    host: Url,
    auth: AuthManager,
    options: ClientOptions,
}

impl Client {
    /// Create a client for `https://bsky.social`
    pub fn new(credentials: Credentials) -> Result<Self, Error> {
        Self::new_with_options(credentials, ClientOptions::default())
    }

    /// Create a client with custom options
    pub fn new_with_options(credentials: Credentials, options: ClientOptions) -> Result<Self, Error> {
        let host = parse_host(&options.host)?;

        let mut builder = HttpClient::builder().user_agent(options.user_agent.clone());
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let api = XrpcSessionApi::new(http_client.clone(), host.clone());
        let auth = AuthManager::new(credentials, std::sync::Arc::new(api), options.auth.clone());

        Ok(Self {
            http_client,
            host,
            auth,
            options,
        })
    }

    /// Create a client from `BOTSKY_HANDLE` / `BOTSKY_APPKEY`
    pub fn from_env() -> Result<Self, Error> {
        Self::new(Credentials::from_env()?)
    }

    /// The session manager backing this client
    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Log in with the configured credentials
    pub async fn authenticate(&self) -> Result<Session, Error> {
        Ok(self.auth.authenticate().await?)
    }

    /// Install an externally obtained token pair.
    ///
    /// A background refresh already in flight replaces this session when it
    /// completes; see [`AuthManager::update_auth`].
    pub fn set_auth(&self, tokens: SessionTokens) -> Result<Session, Error> {
        Ok(self.auth.update_auth(tokens)?)
    }

    /// The current session, if there is a valid one
    pub fn get_auth(&self) -> Option<Session> {
        self.auth.session()
    }

    /// DID of the authenticated account
    pub fn did(&self) -> Option<String> {
        self.auth.did()
    }

    /// Authenticated GET request for an XRPC query
    pub fn get(&self, nsid: &str) -> Result<FetchBuilder<'_>, Error> {
        let token = self.auth.access_token()?;
        let url = xrpc_url(&self.host, nsid)?;
        Ok(Fetch::get(&self.http_client, url).bearer_auth(&token))
    }

    /// Authenticated POST request for an XRPC procedure
    pub fn post(&self, nsid: &str) -> Result<FetchBuilder<'_>, Error> {
        let token = self.auth.access_token()?;
        let url = xrpc_url(&self.host, nsid)?;
        Ok(Fetch::post(&self.http_client, url).bearer_auth(&token))
    }

    /// Run an XRPC query
    pub async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let mut request = self.get(nsid)?;
        for (key, value) in params {
            request = request.query(key, value);
        }
        request.execute().await
    }

    /// Run an XRPC procedure with a JSON body
    pub async fn procedure<B, T>(&self, nsid: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(nsid)?.json(body)?.execute().await
    }

    pub(crate) fn chat_get(&self, nsid: &str) -> Result<FetchBuilder<'_>, Error> {
        Ok(self
            .get(nsid)?
            .header(CHAT_PROXY_HEADER, &self.options.chat_proxy))
    }

    pub(crate) fn chat_post(&self, nsid: &str) -> Result<FetchBuilder<'_>, Error> {
        Ok(self
            .post(nsid)?
            .header(CHAT_PROXY_HEADER, &self.options.chat_proxy))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host.as_str())
            .field("auth", &self.auth)
            .finish()
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::chat::{ChatLogEntry, ChatMessage};
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::listeners::{ChatListener, NotificationListener};
    pub use crate::notification::Notification;
    pub use crate::Client;
    pub use botsky_auth::Credentials;
    pub use botsky_listener::DispatchContext;
}
