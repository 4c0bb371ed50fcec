//! Caller-supplied refresh token.

use super::public_client::PublicClient;
use super::{CredentialKind, TokenSource};
use crate::error::{Error, Result};

/// Redeems a refresh token at construction, then renews silently from an
/// in-memory cache.
pub struct RefreshTokenCredential {
    client: PublicClient,
}

impl RefreshTokenCredential {
    /// Exchange `refresh_token` right away; fails if the exchange fails.
    pub fn new(client: PublicClient, refresh_token: &str) -> Result<Self> {
        client.acquire_token_by_refresh_token(refresh_token)?;
        Ok(Self { client })
    }
}

impl TokenSource for RefreshTokenCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::RefreshToken
    }

    fn get_token(&self) -> Result<String> {
        self.client
            .acquire_token_silent()?
            .ok_or_else(|| Error::Auth("Refresh token could not be redeemed".to_string()))
    }
}
