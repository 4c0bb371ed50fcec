//! Cache-backed public client application for the Azure AD v2.0 endpoints.
//!
//! Holds the OAuth2 client for one app registration plus the token cache of
//! its resource. Every successful grant is written back to the cache, so later
//! processes can acquire tokens silently.

use chrono::Utc;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, CsrfToken, DeviceAuthorizationUrl,
    EndpointNotSet, EndpointSet, ErrorResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, StandardDeviceAuthorizationResponse, TokenResponse,
    TokenUrl,
};
use std::time::Duration;
use tracing::{debug, info};

use super::cache::{CacheHandle, CachedAccount};
use crate::error::{Error, Result};

/// Scope that makes the identity provider hand out refresh tokens.
const OFFLINE_ACCESS: &str = "offline_access";

/// Lifetime assumed when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// OAuth2 client with authorize, device-authorization and token endpoints set.
pub type AzureClient =
    BasicClient<EndpointSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Build the blocking HTTP client used for identity provider calls.
///
/// Redirects are disabled so token endpoints cannot bounce credentials elsewhere.
pub(crate) fn identity_http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(crate::config::DEFAULT_TIMEOUT)
        .build()?)
}

/// Flatten an OAuth2 token request error into an authentication error.
pub(crate) fn token_error<RE, T>(context: &str, err: RequestTokenError<RE, T>) -> Error
where
    RE: std::error::Error + 'static,
    T: ErrorResponse + 'static,
{
    let detail = match err {
        RequestTokenError::ServerResponse(resp) => resp.to_string(),
        RequestTokenError::Request(e) => {
            let mut msg = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(inner) = source {
                msg.push_str(&format!(": {inner}"));
                source = inner.source();
            }
            msg
        }
        RequestTokenError::Parse(e, body) => {
            format!("{e} (body: {})", String::from_utf8_lossy(&body))
        }
        RequestTokenError::Other(s) => s,
    };
    Error::Auth(format!("{context}: {detail}"))
}

/// Public (secretless) client for one registration and resource scope.
pub struct PublicClient {
    oauth: AzureClient,
    http: reqwest::blocking::Client,
    client_id: String,
    scope: String,
    cache: CacheHandle,
}

impl PublicClient {
    /// Create a client against `{authority}/oauth2/v2.0/*`.
    pub fn new(client_id: &str, authority: &str, scope: &str, cache: CacheHandle) -> Result<Self> {
        let authority = authority.trim_end_matches('/');
        let oauth = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(AuthUrl::new(format!("{authority}/oauth2/v2.0/authorize"))?)
            .set_device_authorization_url(DeviceAuthorizationUrl::new(format!(
                "{authority}/oauth2/v2.0/devicecode"
            ))?)
            .set_token_uri(TokenUrl::new(format!("{authority}/oauth2/v2.0/token"))?);

        Ok(Self {
            oauth,
            http: identity_http_client()?,
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            cache,
        })
    }

    /// Resource scope tokens are requested for.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The token cache of this client.
    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    fn scopes(&self) -> [Scope; 2] {
        [
            Scope::new(self.scope.clone()),
            Scope::new(OFFLINE_ACCESS.to_string()),
        ]
    }

    /// Get a token without user interaction.
    ///
    /// Serves the cached access token while it is fresh, otherwise redeems the
    /// cached refresh token. `None` means a visible login is needed.
    pub fn acquire_token_silent(&self) -> Result<Option<String>> {
        let Some(account) = self.cache.find(&self.client_id, &self.scope) else {
            return Ok(None);
        };
        if account.is_fresh(Utc::now().timestamp()) {
            return Ok(Some(account.access_token));
        }
        let Some(refresh_token) = account.refresh_token else {
            return Ok(None);
        };

        debug!("Cached access token expired, redeeming refresh token");
        match self.acquire_token_by_refresh_token(&refresh_token) {
            Ok(token) => Ok(Some(token)),
            Err(Error::Auth(msg)) => {
                debug!("Silent token acquisition failed: {}", msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange a refresh token for an access token and cache the result.
    pub fn acquire_token_by_refresh_token(&self, refresh_token: &str) -> Result<String> {
        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scopes(self.scopes())
            .request(&self.http)
            .map_err(|e| token_error("Refresh token exchange failed", e))?;
        self.store_response(&response, Some(refresh_token))
    }

    /// Start a device-authorization flow.
    pub fn initiate_device_flow(&self) -> Result<StandardDeviceAuthorizationResponse> {
        self.oauth
            .exchange_device_code()
            .add_scopes(self.scopes())
            .request(&self.http)
            .map_err(|e| token_error("Failed to create device flow", e))
    }

    /// Poll the token endpoint until the device flow completes or expires.
    pub fn acquire_token_by_device_flow(
        &self,
        flow: &StandardDeviceAuthorizationResponse,
    ) -> Result<String> {
        let response = self
            .oauth
            .exchange_device_access_token(flow)
            .request(&self.http, std::thread::sleep, None)
            .map_err(|e| token_error("Failed to acquire token by device flow", e))?;
        self.store_response(&response, None)
    }

    /// Authorization URL for a browser login redirecting to `redirect`.
    ///
    /// Returns the URL together with the CSRF state, the PKCE verifier and the
    /// redirect-bound client needed to check and redeem the callback.
    pub fn authorization_request(
        &self,
        redirect: &str,
    ) -> Result<(oauth2::url::Url, CsrfToken, PkceCodeVerifier, AzureClient)> {
        let client = self
            .oauth
            .clone()
            .set_redirect_uri(RedirectUrl::new(redirect.to_string())?);
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes())
            .set_pkce_challenge(challenge)
            .url();
        Ok((url, csrf, verifier, client))
    }

    /// Redeem an authorization code from the browser callback.
    pub fn acquire_token_by_auth_code(
        &self,
        client: &AzureClient,
        code: String,
        verifier: PkceCodeVerifier,
    ) -> Result<String> {
        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request(&self.http)
            .map_err(|e| token_error("Authorization code exchange failed", e))?;
        self.store_response(&response, None)
    }

    fn store_response(
        &self,
        response: &BasicTokenResponse,
        previous_refresh: Option<&str>,
    ) -> Result<String> {
        let access_token = response.access_token().secret().clone();
        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        // Keep the redeemed refresh token when the provider does not rotate it
        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh.map(str::to_string));

        self.cache.store(CachedAccount {
            client_id: self.client_id.clone(),
            scope: self.scope.clone(),
            access_token: access_token.clone(),
            refresh_token,
            expires_at: Utc::now().timestamp() + lifetime.as_secs() as i64,
        })?;
        info!("Token acquired for {}", self.scope);
        Ok(access_token)
    }
}
