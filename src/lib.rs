//! Sumo Wrapper - Rust Implementation
//!
//! Authenticated, retrying client for the Sumo metadata and blob REST API.
//!
//! # Architecture
//!
//! 1. **Configuration** (`config`) - Environments, app registrations, CLI arguments
//! 2. **Authentication** (`auth`) - Credential strategies, selection and the token cache
//! 3. **SDK Layer** (`sdk`) - Retry policy, request executors, blob uploads
//!
//! # Example
//!
//! ```no_run
//! use sumo_wrapper::{AuthOptions, ClientConfig, SumoClient};
//!
//! # fn main() -> sumo_wrapper::Result<()> {
//! let client = SumoClient::new(ClientConfig::for_env("dev")?, &AuthOptions::default())?;
//! let userdata = client.get("/userdata", &[])?;
//! println!("{}", userdata.text());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod sdk;

pub use auth::{AuthOptions, TokenSource};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use sdk::{BlobClient, SumoClient, SumoResponse};

/// Crate version, sent in the user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
