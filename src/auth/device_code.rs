//! Device-code login: the user completes sign-in on another device.

use tracing::info;

use super::cache::protect;
use super::public_client::PublicClient;
use super::{CredentialKind, TokenSource};
use crate::error::{Error, Result};

/// Cache-backed credential that logs in with the device-authorization grant.
pub struct DeviceCodeCredential {
    client: PublicClient,
}

impl DeviceCodeCredential {
    /// Wrap `client`, running the device flow when the cache has no usable
    /// token and `allow_login` is set.
    pub fn new(client: PublicClient, allow_login: bool) -> Result<Self> {
        let credential = Self { client };
        if allow_login && credential.client.acquire_token_silent()?.is_none() {
            credential.login()?;
        }
        Ok(credential)
    }

    /// Print the user code and verification address, then poll until the
    /// login completes elsewhere.
    pub fn login(&self) -> Result<()> {
        let flow = self.client.initiate_device_flow()?;

        let uri = flow.verification_uri().url().as_str();
        let code = flow.user_code().secret();
        eprintln!(
            "To sign in, use a web browser to open the page {uri} and enter the code {code} to authenticate."
        );

        self.client.acquire_token_by_device_flow(&flow)?;
        if let Some(path) = self.client.cache().location() {
            protect(path)?;
        }
        info!("Device code login completed");
        Ok(())
    }
}

impl TokenSource for DeviceCodeCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::DeviceCode
    }

    fn get_token(&self) -> Result<String> {
        self.client
            .acquire_token_silent()?
            .ok_or_else(|| Error::Auth("Not logged in; run the device code login".to_string()))
    }
}
