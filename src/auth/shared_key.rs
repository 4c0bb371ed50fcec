//! Pre-shared static token read from `~/.sumo/<resource>.sharedkey`.

use reqwest::header::HeaderName;
use std::fs;
use std::path::Path;

use super::cache::protect;
use super::{AuthHeader, CredentialKind, TokenSource};
use crate::error::{Error, Result};

/// Header carrying a shared key instead of a bearer token.
pub const SUMO_TOKEN_HEADER: &str = "x-sumo-token";

/// Static token, served verbatim for the life of the process.
#[derive(Debug, Clone)]
pub struct SharedKeyCredential {
    token: String,
}

impl SharedKeyCredential {
    /// Load the key file, fixing its permissions first.
    pub fn from_file(path: &Path) -> Result<Self> {
        protect(path)?;
        let contents = fs::read_to_string(path)?;
        let token = contents.lines().next().unwrap_or_default().trim().to_string();
        if token.is_empty() {
            return Err(Error::Auth(format!(
                "Shared key file {} is empty",
                path.display()
            )));
        }
        Ok(Self { token })
    }
}

impl TokenSource for SharedKeyCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::SharedKey
    }

    fn get_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    fn authorization_header(&self) -> Result<AuthHeader> {
        Ok(AuthHeader {
            name: HeaderName::from_static(SUMO_TOKEN_HEADER),
            value: self.token.clone(),
        })
    }
}
