//! SDK-specific types.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::sdk::retry::StatusCode;

/// Content type for JSON documents.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for binary blobs.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Query parameters for a request.
pub type Params<'a> = &'a [(&'a str, &'a str)];

/// Request body: a JSON document or a binary blob, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(Value),
    Blob(Vec<u8>),
}

impl Payload {
    /// Build a POST payload from the optional blob and JSON arguments.
    ///
    /// An empty blob counts as absent; the content type is JSON unless a
    /// non-empty blob is given.
    pub fn for_post(blob: Option<&[u8]>, json: Option<&Value>) -> Result<Self> {
        let blob = blob.filter(|b| !b.is_empty());
        match (blob, json) {
            (Some(_), Some(_)) => Err(both_payloads()),
            (Some(b), None) => Ok(Self::Blob(b.to_vec())),
            (None, Some(j)) => Ok(Self::Json(j.clone())),
            (None, None) => Ok(Self::Empty),
        }
    }

    /// Build a PUT payload; without JSON the body is sent as a blob.
    pub fn for_put(blob: Option<&[u8]>, json: Option<&Value>) -> Result<Self> {
        match (blob.filter(|b| !b.is_empty()), json) {
            (Some(_), Some(_)) => Err(both_payloads()),
            (_, Some(j)) => Ok(Self::Json(j.clone())),
            (b, None) => Ok(Self::Blob(b.map(<[u8]>::to_vec).unwrap_or_default())),
        }
    }

    /// Content type derived from the payload kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Blob(_) => CONTENT_TYPE_OCTET_STREAM,
            Self::Json(_) | Self::Empty => CONTENT_TYPE_JSON,
        }
    }
}

fn both_payloads() -> Error {
    Error::InvalidArgument("Both blob and json given to the same request".to_string())
}

/// Final response of a request, after retries and the status check.
#[derive(Debug, Clone)]
pub struct SumoResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the Content-Type header, if any
    pub content_type: Option<String>,
    /// Raw response body
    pub body: Vec<u8>,
}

impl StatusCode for SumoResponse {
    fn status_code(&self) -> u16 {
        self.status
    }
}

/// Response body unpacked according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Bytes(Vec<u8>),
    Text(String),
}

impl SumoResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Unpack the body according to the Content-Type header.
    pub fn decoded(&self) -> Result<Body> {
        let ct = self.content_type.as_deref().unwrap_or_default();
        if ct.starts_with(CONTENT_TYPE_OCTET_STREAM) {
            return Ok(Body::Bytes(self.body.clone()));
        }
        if ct.starts_with(CONTENT_TYPE_JSON) {
            return Ok(Body::Json(self.json()?));
        }
        Ok(Body::Text(self.text()))
    }

    /// Turn a non-2xx response into a terminal request error.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let status_text = reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        Err(Error::request(self.status, status_text, self.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, ct: Option<&str>, body: &[u8]) -> SumoResponse {
        SumoResponse {
            status,
            content_type: ct.map(String::from),
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_post_payload_selection() {
        let doc = json!({"a": 1});
        assert_eq!(
            Payload::for_post(None, Some(&doc)).unwrap(),
            Payload::Json(doc.clone())
        );
        assert_eq!(
            Payload::for_post(Some(b"123".as_slice()), None).unwrap(),
            Payload::Blob(b"123".to_vec())
        );
        assert_eq!(Payload::for_post(None, None).unwrap(), Payload::Empty);
        // An empty blob does not conflict with a JSON document
        assert_eq!(
            Payload::for_post(Some(b"".as_slice()), Some(&doc)).unwrap(),
            Payload::Json(doc)
        );
    }

    #[test]
    fn test_both_payloads_rejected() {
        let doc = json!({"a": 1});
        assert!(matches!(
            Payload::for_post(Some(b"x".as_slice()), Some(&doc)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Payload::for_put(Some(b"x".as_slice()), Some(&doc)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_put_without_json_is_blob() {
        let payload = Payload::for_put(None, None).unwrap();
        assert_eq!(payload, Payload::Blob(Vec::new()));
        assert_eq!(payload.content_type(), CONTENT_TYPE_OCTET_STREAM);
        assert_eq!(Payload::Empty.content_type(), CONTENT_TYPE_JSON);
    }

    #[test]
    fn test_decoded_by_content_type() {
        let json_resp = response(200, Some("application/json; charset=utf-8"), br#"{"_id":"abc"}"#);
        assert_eq!(json_resp.decoded().unwrap(), Body::Json(json!({"_id": "abc"})));

        let blob_resp = response(200, Some("application/octet-stream"), b"\x00\x01");
        assert_eq!(blob_resp.decoded().unwrap(), Body::Bytes(vec![0, 1]));

        let text_resp = response(202, None, b"Accepted");
        assert_eq!(text_resp.decoded().unwrap(), Body::Text("Accepted".to_string()));
    }

    #[test]
    fn test_error_for_status() {
        assert!(response(201, None, b"").error_for_status().is_ok());

        let err = response(404, None, b"no such object")
            .error_for_status()
            .unwrap_err();
        match err {
            Error::Request {
                status,
                status_text,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(message, "no such object");
            }
            other => panic!("Expected Request error, got {other:?}"),
        }
    }
}
