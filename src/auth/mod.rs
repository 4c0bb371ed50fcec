//! Authentication for the Sumo API.
//!
//! A [`TokenSource`] produces the header a request is authorized with. Which
//! credential backs it is decided once, when the client is built:
//!
//! 1. a caller-supplied refresh token,
//! 2. a caller-supplied access token,
//! 3. a shared key file in `~/.sumo/`,
//! 4. interactive browser login when asked for,
//! 5. device-code login when asked for,
//! 6. workload identity when its environment is complete,
//! 7. otherwise interactive browser login.

pub mod access_token;
pub mod cache;
pub mod device_code;
pub mod interactive;
pub mod jwt;
pub mod managed;
pub mod public_client;
pub mod refresh_token;
pub mod shared_key;

use reqwest::header::{HeaderName, AUTHORIZATION};
use std::sync::Arc;
use tracing::debug;

use crate::config::AppRegistration;
use crate::error::Result;
use crate::sdk::retry::RetryPolicy;

pub use access_token::AccessTokenCredential;
pub use cache::{CacheHandle, CachedAccount};
pub use device_code::DeviceCodeCredential;
pub use interactive::InteractiveCredential;
pub use managed::{ManagedCredential, WorkloadIdentity};
pub use public_client::PublicClient;
pub use refresh_token::RefreshTokenCredential;
pub use shared_key::SharedKeyCredential;

/// Credential variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    AccessToken,
    RefreshToken,
    Interactive,
    DeviceCode,
    Managed,
    SharedKey,
}

impl CredentialKind {
    /// Whether the credential can re-acquire a token on its own.
    pub fn can_refresh(self) -> bool {
        !matches!(self, Self::AccessToken | Self::SharedKey)
    }
}

/// One authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: HeaderName,
    pub value: String,
}

impl AuthHeader {
    /// `Authorization: Bearer <token>`
    pub fn bearer(token: &str) -> Self {
        Self {
            name: AUTHORIZATION,
            value: format!("Bearer {token}"),
        }
    }
}

/// Something that can hand out tokens for the Sumo API.
///
/// Implementations may block on identity provider I/O.
pub trait TokenSource: Send + Sync {
    fn kind(&self) -> CredentialKind;

    /// Current token; fails with `Error::Auth` when none can be produced.
    fn get_token(&self) -> Result<String>;

    fn authorization_header(&self) -> Result<AuthHeader> {
        Ok(AuthHeader::bearer(&self.get_token()?))
    }
}

/// Scope requesting the default permissions of a resource.
pub fn scope_for_resource(resource_id: &str) -> String {
    format!("{resource_id}/.default")
}

/// Explicit authentication inputs.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub interactive: bool,
    pub devicecode: bool,
    /// Allow cache-backed credentials to start a visible login
    pub allow_login: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            interactive: false,
            devicecode: false,
            allow_login: true,
        }
    }
}

impl AuthOptions {
    /// Options for a token of unknown kind: JWTs are access tokens, anything
    /// else is taken to be a refresh token.
    pub fn from_token(token: &str) -> Self {
        if jwt::decode_claims(token).is_some() {
            Self {
                access_token: Some(token.to_string()),
                ..Self::default()
            }
        } else {
            Self {
                refresh_token: Some(token.to_string()),
                ..Self::default()
            }
        }
    }
}

/// Selected credential, before it is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    RefreshToken(String),
    AccessToken(String),
    SharedKey,
    Interactive,
    DeviceCode,
    Managed(WorkloadIdentity),
}

/// Pick a credential from the explicit inputs and the environment.
pub fn select_strategy(
    options: &AuthOptions,
    shared_key_present: bool,
    workload: Option<WorkloadIdentity>,
) -> Strategy {
    let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();

    if let Some(token) = non_empty(&options.refresh_token) {
        return Strategy::RefreshToken(token);
    }
    if let Some(token) = non_empty(&options.access_token) {
        return Strategy::AccessToken(token);
    }
    if shared_key_present {
        return Strategy::SharedKey;
    }
    if options.interactive {
        return Strategy::Interactive;
    }
    if options.devicecode {
        return Strategy::DeviceCode;
    }
    match workload {
        Some(identity) => Strategy::Managed(identity),
        None => Strategy::Interactive,
    }
}

/// Build the token source for a registration.
///
/// May perform identity provider I/O (and a visible login), so it must not
/// run on an async runtime thread.
pub fn get_auth_provider(
    registration: &AppRegistration,
    authority: &str,
    options: &AuthOptions,
    retry: &RetryPolicy,
) -> Result<Arc<dyn TokenSource>> {
    let resource_id = registration.resource_id.as_str();
    let scope = scope_for_resource(resource_id);
    let shared_key_path = cache::token_path(resource_id, cache::SHARED_KEY_SUFFIX)?;

    let strategy = select_strategy(
        options,
        shared_key_path.exists(),
        WorkloadIdentity::from_env(),
    );
    debug!("Selected credential strategy {:?}", kind_of(&strategy));

    let cached_client = || -> Result<PublicClient> {
        let cache = cache::get_cache(resource_id, cache::TOKEN_SUFFIX, retry)?;
        PublicClient::new(&registration.client_id, authority, &scope, cache)
    };

    let source: Arc<dyn TokenSource> = match strategy {
        Strategy::RefreshToken(token) => {
            let client = PublicClient::new(
                &registration.client_id,
                authority,
                &scope,
                CacheHandle::in_memory(),
            )?;
            Arc::new(RefreshTokenCredential::new(client, &token)?)
        }
        Strategy::AccessToken(token) => Arc::new(AccessTokenCredential::new(&token)?),
        Strategy::SharedKey => Arc::new(SharedKeyCredential::from_file(&shared_key_path)?),
        Strategy::Interactive => Arc::new(InteractiveCredential::new(
            cached_client()?,
            options.allow_login,
        )?),
        Strategy::DeviceCode => Arc::new(DeviceCodeCredential::new(
            cached_client()?,
            options.allow_login,
        )?),
        Strategy::Managed(identity) => Arc::new(ManagedCredential::new(identity, &scope)?),
    };
    Ok(source)
}

fn kind_of(strategy: &Strategy) -> CredentialKind {
    match strategy {
        Strategy::RefreshToken(_) => CredentialKind::RefreshToken,
        Strategy::AccessToken(_) => CredentialKind::AccessToken,
        Strategy::SharedKey => CredentialKind::SharedKey,
        Strategy::Interactive => CredentialKind::Interactive,
        Strategy::DeviceCode => CredentialKind::DeviceCode,
        Strategy::Managed(_) => CredentialKind::Managed,
    }
}
