//! Workload identity (federated managed identity) credential.
//!
//! The platform mounts a short-lived federated token at
//! `AZURE_FEDERATED_TOKEN_FILE`; it is presented as a client assertion in a
//! client-credentials grant. Tokens are only kept in memory.

use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, ClientId, EndpointNotSet, EndpointSet, Scope, TokenResponse, TokenUrl,
};
use parking_lot::RwLock;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::cache::EXPIRY_BUFFER_SECS;
use super::public_client::{identity_http_client, token_error};
use super::{CredentialKind, TokenSource};
use crate::error::Result;

/// Environment variables that must all be set for workload identity.
pub const WORKLOAD_IDENTITY_VARS: [&str; 4] = [
    "AZURE_FEDERATED_TOKEN_FILE",
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_ID",
    "AZURE_AUTHORITY_HOST",
];

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Workload identity settings injected by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadIdentity {
    pub token_file: PathBuf,
    pub tenant_id: String,
    pub client_id: String,
    pub authority_host: String,
}

impl WorkloadIdentity {
    /// Read the settings from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Read the settings through `lookup`; `None` unless every variable is
    /// set and non-empty.
    pub fn from_env_with<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let [file, tenant, client, host] =
            WORKLOAD_IDENTITY_VARS.map(|name| lookup(name).filter(|v| !v.is_empty()));
        Some(Self {
            token_file: PathBuf::from(file?),
            tenant_id: tenant?,
            client_id: client?,
            authority_host: host?,
        })
    }

    /// Token endpoint of the workload's tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_valid(&self, now: i64) -> bool {
        now < self.expires_at - EXPIRY_BUFFER_SECS
    }
}

/// Credential backed by the platform's workload identity.
pub struct ManagedCredential {
    identity: WorkloadIdentity,
    scope: String,
    oauth: TokenClient,
    http: reqwest::blocking::Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl ManagedCredential {
    pub fn new(identity: WorkloadIdentity, scope: &str) -> Result<Self> {
        let oauth = BasicClient::new(ClientId::new(identity.client_id.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(TokenUrl::new(identity.token_url())?);
        Ok(Self {
            identity,
            scope: scope.to_string(),
            oauth,
            http: identity_http_client()?,
            cached_token: RwLock::new(None),
        })
    }

    fn fetch_token(&self) -> Result<CachedToken> {
        // The federated token rotates; read it for every exchange
        let assertion = fs::read_to_string(&self.identity.token_file)?;
        let response = self
            .oauth
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .add_extra_param("client_assertion_type", CLIENT_ASSERTION_TYPE)
            .add_extra_param("client_assertion", assertion.trim().to_string())
            .request(&self.http)
            .map_err(|e| token_error("Managed identity token request failed", e))?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        Ok(CachedToken {
            token: response.access_token().secret().clone(),
            expires_at: Utc::now().timestamp() + lifetime.as_secs() as i64,
        })
    }
}

impl TokenSource for ManagedCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Managed
    }

    fn get_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        {
            let cache = self.cached_token.read();
            if let Some(cached) = cache.as_ref().filter(|c| c.is_valid(now)) {
                return Ok(cached.token.clone());
            }
        }

        debug!("Requesting managed identity token for {}", self.scope);
        let fresh = self.fetch_token()?;
        let token = fresh.token.clone();
        *self.cached_token.write() = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("AZURE_FEDERATED_TOKEN_FILE", "/var/run/token".to_string()),
            ("AZURE_TENANT_ID", "tenant".to_string()),
            ("AZURE_CLIENT_ID", "client".to_string()),
            ("AZURE_AUTHORITY_HOST", "https://login.microsoftonline.com/".to_string()),
        ])
    }

    #[test]
    fn test_all_variables_required() {
        let env = full_env();
        let identity = WorkloadIdentity::from_env_with(|k| env.get(k).cloned()).unwrap();
        assert_eq!(identity.token_file, PathBuf::from("/var/run/token"));
        assert_eq!(
            identity.token_url(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );

        for missing in WORKLOAD_IDENTITY_VARS {
            let mut partial = full_env();
            partial.remove(missing);
            assert!(WorkloadIdentity::from_env_with(|k| partial.get(k).cloned()).is_none());
        }

        let mut blank = full_env();
        blank.insert("AZURE_TENANT_ID", String::new());
        assert!(WorkloadIdentity::from_env_with(|k| blank.get(k).cloned()).is_none());
    }

    #[test]
    fn test_cached_token_served_without_network() {
        let env = full_env();
        let identity = WorkloadIdentity::from_env_with(|k| env.get(k).cloned()).unwrap();
        let credential = ManagedCredential::new(identity, "res/.default").unwrap();
        *credential.cached_token.write() = Some(CachedToken {
            token: "mi-token".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
        });

        assert_eq!(credential.get_token().unwrap(), "mi-token");
        assert_eq!(credential.get_token().unwrap(), "mi-token");
        assert!(credential.kind().can_refresh());
    }

    #[test]
    fn test_missing_token_file_fails() {
        let env = full_env();
        let mut identity = WorkloadIdentity::from_env_with(|k| env.get(k).cloned()).unwrap();
        identity.token_file = PathBuf::from("/nonexistent/federated-token");
        let credential = ManagedCredential::new(identity, "res/.default").unwrap();
        assert!(matches!(credential.get_token(), Err(Error::Io(_))));
    }

    #[test]
    fn test_cached_token_validity_buffer() {
        let now = 1_000;
        assert!(CachedToken { token: String::new(), expires_at: now + 3600 }.is_valid(now));
        assert!(!CachedToken { token: String::new(), expires_at: now + EXPIRY_BUFFER_SECS }.is_valid(now));
    }
}
