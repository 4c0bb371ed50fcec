//! Sumo SDK.
//!
//! # Architecture
//!
//! - `api_client` - Authenticated client for the Sumo REST API
//! - `blob` - Blob uploads to pre-authorized URLs
//! - `retry` - Retry logic with exponential backoff
//! - `transport` - Blocking and async request executors
//! - `types` - Payloads and responses

pub mod api_client;
pub mod blob;
pub mod retry;
pub mod transport;
pub mod types;

pub use api_client::SumoClient;
pub use blob::BlobClient;
pub use retry::{RetryPolicy, Retryer};
pub use types::*;
