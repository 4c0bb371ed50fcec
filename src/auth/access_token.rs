//! Caller-supplied access token.

use chrono::Utc;

use super::{jwt, CredentialKind, TokenSource};
use crate::error::{Error, Result};

/// Wraps a JWT handed in by the caller. Never refreshes itself.
#[derive(Debug, Clone)]
pub struct AccessTokenCredential {
    token: String,
    expires_at: i64,
}

impl AccessTokenCredential {
    /// Read the `exp` claim of `token` (signature is not verified).
    pub fn new(token: &str) -> Result<Self> {
        let claims = jwt::decode_claims(token)
            .ok_or_else(|| Error::Auth("Access token is not a valid JWT".to_string()))?;
        let expires_at = jwt::expiry(&claims)
            .ok_or_else(|| Error::Auth("Access token has no exp claim".to_string()))?;
        Ok(Self {
            token: token.to_string(),
            expires_at,
        })
    }

    /// Expiry as unix seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// The token as seen at unix time `now`.
    pub fn token_at(&self, now: i64) -> Result<String> {
        if now >= self.expires_at {
            return Err(Error::Auth("Access token has expired.".to_string()));
        }
        Ok(self.token.clone())
    }
}

impl TokenSource for AccessTokenCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::AccessToken
    }

    fn get_token(&self) -> Result<String> {
        self.token_at(Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::make_jwt;
    use serde_json::json;

    #[test]
    fn test_valid_strictly_before_exp() {
        let token = make_jwt(&json!({"exp": 2_000}));
        let cred = AccessTokenCredential::new(&token).unwrap();

        assert_eq!(cred.expires_at(), 2_000);
        assert_eq!(cred.token_at(0).unwrap(), token);
        assert_eq!(cred.token_at(1_999).unwrap(), token);
    }

    #[test]
    fn test_expired_at_and_after_exp() {
        let cred = AccessTokenCredential::new(&make_jwt(&json!({"exp": 2_000}))).unwrap();
        for now in [2_000, 2_001, 10_000] {
            let err = cred.token_at(now).unwrap_err();
            assert!(matches!(err, Error::Auth(ref m) if m == "Access token has expired."));
        }
    }

    #[test]
    fn test_get_token_uses_wall_clock() {
        let future = Utc::now().timestamp() + 3600;
        let live = AccessTokenCredential::new(&make_jwt(&json!({"exp": future}))).unwrap();
        assert!(live.get_token().is_ok());
        assert_eq!(live.kind(), CredentialKind::AccessToken);
        assert!(!live.kind().can_refresh());

        let past = AccessTokenCredential::new(&make_jwt(&json!({"exp": 1}))).unwrap();
        assert!(matches!(past.get_token(), Err(Error::Auth(_))));
    }

    #[test]
    fn test_rejects_non_jwt() {
        assert!(matches!(
            AccessTokenCredential::new("opaque"),
            Err(Error::Auth(_))
        ));
        assert!(AccessTokenCredential::new(&make_jwt(&json!({"sub": "x"}))).is_err());
    }
}
