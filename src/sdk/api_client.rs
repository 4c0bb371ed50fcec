//! HTTP client for the Sumo REST API.
//!
//! Every verb exists twice: a blocking form for plain threads and an `_async`
//! form for the tokio runtime. Both share the retry policy, the header logic
//! and the terminal status check.

use futures::TryFutureExt;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, debug_span, Instrument};
use uuid::Uuid;

use crate::auth::{get_auth_provider, AuthHeader, AuthOptions, TokenSource};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::sdk::blob::BlobClient;
use crate::sdk::retry::Retryer;
use crate::sdk::transport::{
    authorization_header_async, build_headers, execute_async, execute_blocking, HttpClients,
    PreparedRequest,
};
use crate::sdk::types::{Params, Payload, SumoResponse};

/// Authenticated client for one Sumo environment.
#[derive(Clone)]
pub struct SumoClient {
    config: ClientConfig,
    auth: Arc<dyn TokenSource>,
    http: Arc<HttpClients>,
    retryer: Retryer,
}

impl std::fmt::Debug for SumoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SumoClient")
            .field("env", &self.config.env)
            .field("base_url", &self.config.base_url)
            .field("credential", &self.auth.kind())
            .finish()
    }
}

impl SumoClient {
    /// Create a client, selecting and initializing the credential.
    ///
    /// Credential setup may talk to the identity provider (or run a visible
    /// login), so this blocks. From async code use [`SumoClient::connect`].
    pub fn new(config: ClientConfig, options: &AuthOptions) -> Result<Self> {
        let auth = get_auth_provider(
            &config.registration,
            &config.authority,
            options,
            &config.retry,
        )?;
        Self::with_auth(config, auth)
    }

    /// Async form of [`SumoClient::new`]; credential setup runs on the
    /// blocking pool.
    pub async fn connect(config: ClientConfig, options: AuthOptions) -> Result<Self> {
        let (config, auth) = tokio::task::spawn_blocking(move || {
            get_auth_provider(
                &config.registration,
                &config.authority,
                &options,
                &config.retry,
            )
            .map(|auth| (config, auth))
        })
        .map_err(|e| Error::Internal(format!("Credential setup task failed: {}", e)))
        .await??;
        Self::with_auth(config, auth)
    }

    /// Create a client around an existing token source.
    pub fn with_auth(config: ClientConfig, auth: Arc<dyn TokenSource>) -> Result<Self> {
        let http = Arc::new(HttpClients::new(config.timeout)?);
        let retryer = config.retry.make_retryer();
        debug!(
            "Sumo client for {} at {} using {:?} credential",
            config.env,
            config.base_url,
            auth.kind()
        );
        Ok(Self {
            config,
            auth,
            http,
            retryer,
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The token source authorizing requests.
    pub fn auth(&self) -> &Arc<dyn TokenSource> {
        &self.auth
    }

    /// Current token; `None` when the credential cannot produce one.
    pub fn authenticate(&self) -> Option<String> {
        match self.auth.get_token() {
            Ok(token) => Some(token),
            Err(e) => {
                debug!("No token available: {}", e);
                None
            }
        }
    }

    /// Blob uploader sharing this client's transports and credential.
    pub fn blob_client(&self) -> BlobClient {
        BlobClient::new(
            Arc::clone(&self.http),
            Arc::clone(&self.auth),
            self.retryer.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        payload: &Payload,
        params: Params<'_>,
        auth: &AuthHeader,
    ) -> Result<PreparedRequest> {
        let headers = build_headers(payload.content_type(), Some(auth))?;
        PreparedRequest::new(method, self.url(path), headers)
            .with_query(params)
            .with_payload(payload)
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        params: Params<'_>,
    ) -> Result<SumoResponse> {
        let span = debug_span!("sumo_request", %method, path, request_id = %Uuid::new_v4());
        let _enter = span.enter();

        let auth = self.auth.authorization_header()?;
        let request = self.prepare(method, path, &payload, params, &auth)?;
        let response = execute_blocking(&self.http, &self.retryer, &request)?;
        debug!(status = response.status, "Request completed");
        Ok(response)
    }

    async fn execute_async(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        params: Params<'_>,
    ) -> Result<SumoResponse> {
        let span = debug_span!("sumo_request", %method, path, request_id = %Uuid::new_v4());
        async move {
            let auth = authorization_header_async(&self.auth).await?;
            let request = self.prepare(method, path, &payload, params, &auth)?;
            let response = execute_async(&self.http, &self.retryer, &request).await?;
            debug!(status = response.status, "Request completed");
            Ok(response)
        }
        .instrument(span)
        .await
    }

    // ===== Blocking API =====

    /// GET `path` with optional query parameters.
    pub fn get(&self, path: &str, params: Params<'_>) -> Result<SumoResponse> {
        self.execute(Method::GET, path, Payload::Empty, params)
    }

    /// POST a JSON document or a blob (never both) to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` before any network call when both a
    /// non-empty blob and a JSON document are given.
    pub fn post(
        &self,
        path: &str,
        blob: Option<&[u8]>,
        json: Option<&Value>,
        params: Params<'_>,
    ) -> Result<SumoResponse> {
        let payload = Payload::for_post(blob, json)?;
        self.execute(Method::POST, path, payload, params)
    }

    /// PUT a JSON document or a blob (never both) to `path`.
    pub fn put(&self, path: &str, blob: Option<&[u8]>, json: Option<&Value>) -> Result<SumoResponse> {
        let payload = Payload::for_put(blob, json)?;
        self.execute(Method::PUT, path, payload, &[])
    }

    /// DELETE `path`.
    pub fn delete(&self, path: &str, params: Params<'_>) -> Result<SumoResponse> {
        self.execute(Method::DELETE, path, Payload::Empty, params)
    }

    // ===== Async API =====

    pub async fn get_async(&self, path: &str, params: Params<'_>) -> Result<SumoResponse> {
        self.execute_async(Method::GET, path, Payload::Empty, params)
            .await
    }

    pub async fn post_async(
        &self,
        path: &str,
        blob: Option<&[u8]>,
        json: Option<&Value>,
        params: Params<'_>,
    ) -> Result<SumoResponse> {
        let payload = Payload::for_post(blob, json)?;
        self.execute_async(Method::POST, path, payload, params)
            .await
    }

    pub async fn put_async(
        &self,
        path: &str,
        blob: Option<&[u8]>,
        json: Option<&Value>,
    ) -> Result<SumoResponse> {
        let payload = Payload::for_put(blob, json)?;
        self.execute_async(Method::PUT, path, payload, &[]).await
    }

    pub async fn delete_async(&self, path: &str, params: Params<'_>) -> Result<SumoResponse> {
        self.execute_async(Method::DELETE, path, Payload::Empty, params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Token source counting how often it is asked for a token.
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl TokenSource for CountingSource {
        fn kind(&self) -> CredentialKind {
            CredentialKind::AccessToken
        }

        fn get_token(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("tok".to_string())
        }
    }

    fn client() -> (SumoClient, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let config = ClientConfig::for_env("localhost").unwrap();
        let client = SumoClient::with_auth(config, source.clone()).unwrap();
        (client, source)
    }

    #[test]
    fn test_url_joining() {
        let (client, _) = client();
        assert_eq!(client.base_url(), "http://localhost:8084/api/v1");
        assert_eq!(
            client.url("/objects('abc')"),
            "http://localhost:8084/api/v1/objects('abc')"
        );
    }

    #[test]
    fn test_both_payloads_rejected_before_auth() {
        let (client, source) = client();
        let doc = json!({"a": 1});

        let err = client
            .post("/objects", Some(b"x".as_slice()), Some(&doc), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = client
            .put("/objects('a')", Some(b"x".as_slice()), Some(&doc))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_both_payloads_rejected() {
        let (client, source) = client();
        let doc = json!({"a": 1});

        let result = client
            .post_async("/objects", Some(b"x".as_slice()), Some(&doc), &[])
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_authenticate_returns_token() {
        let (client, source) = client();
        assert_eq!(client.authenticate().as_deref(), Some("tok"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            client.auth().authorization_header().unwrap(),
            AuthHeader::bearer("tok")
        );
    }

    #[test]
    fn test_prepare_sets_content_type() {
        let (client, _) = client();
        let auth = AuthHeader::bearer("tok");

        let blob = client
            .prepare(Method::POST, "/objects('a')", &Payload::Blob(vec![1]), &[], &auth)
            .unwrap();
        assert_eq!(
            blob.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );

        let doc = client
            .prepare(
                Method::GET,
                "/search",
                &Payload::Empty,
                &[("$query", "class:case")],
                &auth,
            )
            .unwrap();
        assert_eq!(
            doc.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(doc.query.len(), 1);
        assert_eq!(doc.url, "http://localhost:8084/api/v1/search");
    }
}
