//! Blob uploads to object storage.
//!
//! Upload URLs are usually pre-authorized: a signed URL carries its own
//! authorization in the `sig` query parameter, and adding a bearer token on
//! top would make the storage service reject the request.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, debug_span, Instrument};
use uuid::Uuid;

use crate::auth::{AuthHeader, TokenSource};
use crate::error::Result;
use crate::sdk::retry::Retryer;
use crate::sdk::transport::{
    authorization_header_async, build_headers, execute_async, execute_blocking, HttpClients,
    PreparedRequest,
};
use crate::sdk::types::{Payload, SumoResponse, CONTENT_TYPE_OCTET_STREAM};

/// Storage header selecting the blob type.
pub const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Blob type of every upload.
pub const BLOCK_BLOB: &str = "BlockBlob";

/// Query parameter marking a signed URL.
const SIGNATURE_PARAM: &str = "sig";

/// Whether `url` carries its own signature.
pub fn is_pre_authorized(url: &str) -> bool {
    oauth2::url::Url::parse(url)
        .map(|u| u.query_pairs().any(|(k, _)| k == SIGNATURE_PARAM))
        .unwrap_or(false)
}

/// Headers of an upload; `auth` is only used for unsigned URLs.
pub fn upload_headers(url: &str, auth: Option<&AuthHeader>) -> Result<HeaderMap> {
    let auth = if is_pre_authorized(url) { None } else { auth };
    let mut headers = build_headers(CONTENT_TYPE_OCTET_STREAM, auth)?;
    headers.insert(
        HeaderName::from_static(BLOB_TYPE_HEADER),
        HeaderValue::from_static(BLOCK_BLOB),
    );
    Ok(headers)
}

/// Uploads blobs with the retry policy of the owning client.
#[derive(Clone)]
pub struct BlobClient {
    http: Arc<HttpClients>,
    auth: Arc<dyn TokenSource>,
    retryer: Retryer,
}

impl BlobClient {
    pub fn new(http: Arc<HttpClients>, auth: Arc<dyn TokenSource>, retryer: Retryer) -> Self {
        Self {
            http,
            auth,
            retryer,
        }
    }

    fn prepare(&self, content: &[u8], url: &str, auth: Option<&AuthHeader>) -> Result<PreparedRequest> {
        PreparedRequest::new(Method::PUT, url.to_string(), upload_headers(url, auth)?)
            .with_payload(&Payload::Blob(content.to_vec()))
    }

    /// Upload `content` to `url`.
    pub fn upload(&self, content: &[u8], url: &str) -> Result<SumoResponse> {
        let span = debug_span!("blob_upload", size = content.len(), request_id = %Uuid::new_v4());
        let _enter = span.enter();

        let auth = if is_pre_authorized(url) {
            None
        } else {
            Some(self.auth.authorization_header()?)
        };
        let request = self.prepare(content, url, auth.as_ref())?;
        let response = execute_blocking(&self.http, &self.retryer, &request)?;
        debug!(status = response.status, "Blob uploaded");
        Ok(response)
    }

    /// Async form of [`BlobClient::upload`].
    pub async fn upload_async(&self, content: &[u8], url: &str) -> Result<SumoResponse> {
        let span = debug_span!("blob_upload", size = content.len(), request_id = %Uuid::new_v4());
        async move {
            let auth = if is_pre_authorized(url) {
                None
            } else {
                Some(authorization_header_async(&self.auth).await?)
            };
            let request = self.prepare(content, url, auth.as_ref())?;
            let response = execute_async(&self.http, &self.retryer, &request).await?;
            debug!(status = response.status, "Blob uploaded");
            Ok(response)
        }
        .instrument(span)
        .await
    }
}
