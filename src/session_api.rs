//! Login and refresh over XRPC

use async_trait::async_trait;
use botsky_auth::{AuthError, SessionApi, SessionTokens};
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::fetch::Fetch;
use crate::xrpc_url;

pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

/// [`SessionApi`] backed by `com.atproto.server.createSession` and
/// `com.atproto.server.refreshSession`.
#[derive(Debug, Clone)]
pub struct XrpcSessionApi {
    http: Client,
    host: Url,
}

impl XrpcSessionApi {
    pub fn new(http: Client, host: Url) -> Self {
        Self { http, host }
    }
}

#[async_trait]
impl SessionApi for XrpcSessionApi {
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, AuthError> {
        let url = xrpc_url(&self.host, CREATE_SESSION).map_err(AuthError::authentication)?;
        Fetch::post(&self.http, url)
            .json(&CreateSessionInput {
                identifier,
                password,
            })
            .map_err(AuthError::authentication)?
            .execute()
            .await
            .map_err(AuthError::authentication)
    }

    async fn refresh_session(&self, refresh_jwt: &str) -> Result<SessionTokens, AuthError> {
        let url = xrpc_url(&self.host, REFRESH_SESSION).map_err(AuthError::refresh)?;
        Fetch::post(&self.http, url)
            .bearer_auth(refresh_jwt)
            .execute()
            .await
            .map_err(AuthError::refresh)
    }
}
