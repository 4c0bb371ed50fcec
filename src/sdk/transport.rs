//! Request execution shared by the API and blob clients.
//!
//! Both executors build the same request, run it under the same retryer and
//! finish with the same terminal status check. Only the transport differs:
//! `reqwest::blocking` with thread sleeps, or `reqwest` on the tokio runtime.

use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthHeader, TokenSource};
use crate::error::{Error, Result};
use crate::sdk::retry::Retryer;
use crate::sdk::types::{Payload, SumoResponse};
use crate::VERSION;

/// User agent string for API requests.
fn user_agent() -> String {
    format!("sumo-wrapper/{} (rust)", VERSION)
}

/// HTTP transports for one client.
///
/// The blocking client is created on first use; building it on an async
/// runtime thread is not allowed.
#[derive(Debug)]
pub struct HttpClients {
    timeout: Duration,
    asynchronous: reqwest::Client,
    blocking: OnceCell<reqwest::blocking::Client>,
}

impl HttpClients {
    /// Create transports with an absolute per-call timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let asynchronous = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            timeout,
            asynchronous,
            blocking: OnceCell::new(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn asynchronous(&self) -> &reqwest::Client {
        &self.asynchronous
    }

    pub fn blocking(&self) -> Result<&reqwest::blocking::Client> {
        self.blocking.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .user_agent(user_agent())
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
        })
    }
}

/// Headers for one call: content type plus the optional auth header.
pub fn build_headers(content_type: &str, auth: Option<&AuthHeader>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(content_type).map_err(|e| {
        Error::InvalidArgument(format!("Invalid content type {:?}: {}", content_type, e))
    })?;
    headers.insert(CONTENT_TYPE, content_type);
    if let Some(auth) = auth {
        let mut value = HeaderValue::from_str(&auth.value)
            .map_err(|e| Error::Auth(format!("Invalid authorization header: {}", e)))?;
        value.set_sensitive(true);
        headers.insert(auth.name.clone(), value);
    }
    Ok(headers)
}

/// Fetch the auth header without blocking the runtime.
pub(crate) async fn authorization_header_async(auth: &Arc<dyn TokenSource>) -> Result<AuthHeader> {
    let auth = Arc::clone(auth);
    tokio::task::spawn_blocking(move || auth.authorization_header())
        .await
        .map_err(|e| Error::Internal(format!("Token task failed: {}", e)))?
}

/// One fully prepared call, replayed on every attempt.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl PreparedRequest {
    pub fn new(method: Method, url: String, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, params: &[(&str, &str)]) -> Self {
        self.query = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn with_payload(mut self, payload: &Payload) -> Result<Self> {
        self.body = match payload {
            Payload::Empty => None,
            Payload::Json(value) => Some(serde_json::to_vec(value)?),
            Payload::Blob(bytes) => Some(bytes.clone()),
        };
        Ok(self)
    }

    fn send_blocking(&self, client: &reqwest::blocking::Client) -> Result<SumoResponse> {
        let mut builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let content_type = content_type_of(response.headers());
        let body = response.bytes()?.to_vec();
        Ok(SumoResponse {
            status,
            content_type,
            body,
        })
    }

    async fn send_async(&self, client: &reqwest::Client) -> Result<SumoResponse> {
        let mut builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = content_type_of(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok(SumoResponse {
            status,
            content_type,
            body,
        })
    }
}

fn content_type_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Run a request on the blocking transport: retries, then the status check.
pub(crate) fn execute_blocking(
    http: &HttpClients,
    retryer: &Retryer,
    request: &PreparedRequest,
) -> Result<SumoResponse> {
    let client = http.blocking()?;
    let response = retryer.call(|| request.send_blocking(client))?;
    response.error_for_status()
}

/// Run a request on the async transport: retries, then the status check.
pub(crate) async fn execute_async(
    http: &HttpClients,
    retryer: &Retryer,
    request: &PreparedRequest,
) -> Result<SumoResponse> {
    let client = http.asynchronous();
    let response = retryer
        .call_async(|| request.send_async(client))
        .await?;
    response.error_for_status()
}
