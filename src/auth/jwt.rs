//! Unverified JWT decoding.
//!
//! Only the claims are read; signatures are the resource server's business.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::Value;

fn decode_segment(segment: &str) -> Option<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    value.is_object().then_some(value)
}

/// Decode the claims of a JWT without verifying its signature.
///
/// Returns `None` unless the token has three segments whose header and
/// payload are base64url-encoded JSON objects.
pub fn decode_claims(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let (header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    decode_segment(header)?;
    decode_segment(payload)
}

/// The `exp` claim as unix seconds.
pub fn expiry(claims: &Value) -> Option<i64> {
    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
}

#[cfg(test)]
pub(crate) fn make_jwt(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    format!("{header}.{payload_b64}.sig")
}
