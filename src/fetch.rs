//! HTTP request builder for XRPC calls

use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Body of a failed XRPC call.
#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Helper for building and executing XRPC requests
#[derive(Debug)]
pub struct FetchBuilder<'a> {
    client: &'a Client,
    url: Url,
    method: Method,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl<'a> FetchBuilder<'a> {
    /// Create a new FetchBuilder
    pub fn new(client: &'a Client, url: Url, method: Method) -> Self {
        Self {
            client,
            url,
            method,
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            body: None,
        }
    }

    /// Add a header to the request. Values that are not valid header values
    /// are skipped.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => debug!("Skipping invalid value for header {}", name),
        }
        self
    }

    /// Add bearer token authentication to the request
    pub fn bearer_auth(mut self, token: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            self.headers.insert(AUTHORIZATION, value);
        }
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// Append an optional query parameter, skipping `None`
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(body)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(json);
        Ok(self)
    }

    fn build(&self) -> RequestBuilder {
        let mut url = self.url.clone();
        if !self.query_params.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                query_pairs.append_pair(key, value);
            }
        }

        let mut req = self.client.request(self.method.clone(), url);
        req = req.headers(self.headers.clone());
        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }
        req
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let response = self.execute_checked().await?;
        Ok(response.json::<T>().await?)
    }

    /// Execute the request, discarding any response body
    pub async fn execute_empty(&self) -> Result<(), Error> {
        self.execute_checked().await?;
        Ok(())
    }

    /// Execute the request and return the raw response
    pub async fn execute_raw(&self) -> Result<Response, Error> {
        Ok(self.build().send().await?)
    }

    async fn execute_checked(&self) -> Result<Response, Error> {
        debug!("{} {}", self.method, self.url.path());
        let response = self.execute_raw().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Decode an XRPC error body. Bodies that are not the standard
/// `{ "error", "message" }` shape keep the status text and raw body.
pub async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return Error::Http(e),
    };

    let reason = status.canonical_reason().unwrap_or("Unknown");
    match serde_json::from_str::<XrpcErrorBody>(&text) {
        Ok(body) => Error::api(
            status.as_u16(),
            body.error.unwrap_or_else(|| reason.to_string()),
            body.message.unwrap_or_default(),
        ),
        Err(_) => Error::api(status.as_u16(), reason, text),
    }
}

/// Helper for creating XRPC requests
pub struct Fetch;

impl Fetch {
    /// Create a GET request (XRPC query)
    pub fn get(client: &Client, url: Url) -> FetchBuilder<'_> {
        FetchBuilder::new(client, url, Method::GET)
    }

    /// Create a POST request (XRPC procedure)
    pub fn post(client: &Client, url: Url) -> FetchBuilder<'_> {
        FetchBuilder::new(client, url, Method::POST)
    }
}
