//! Configuration management for the Sumo client.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sdk::retry::RetryPolicy;

/// Azure AD tenant hosting the Sumo app registrations.
pub const TENANT_ID: &str = "3aa4a235-b6e2-48d5-9195-7fcf05b459b0";

/// Azure AD authority host.
pub const AUTHORITY_HOST_URI: &str = "https://login.microsoftonline.com";

/// Absolute timeout applied to every network call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Environment served from a local development API.
pub const LOCALHOST: &str = "localhost";

const DEV_CLIENT_ID: &str = "1826bd7c-582f-4838-880d-5b4da5c3eea2";
const DEV_RESOURCE_ID: &str = "88d2b022-3539-4dda-9e66-853801334a86";

/// Azure app registration used to obtain tokens for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRegistration {
    pub client_id: String,
    pub resource_id: String,
}

/// Built-in app registration for a known environment.
pub fn registration_for(env: &str) -> Option<AppRegistration> {
    match env {
        "dev" | LOCALHOST => Some(AppRegistration {
            client_id: DEV_CLIENT_ID.to_string(),
            resource_id: DEV_RESOURCE_ID.to_string(),
        }),
        _ => None,
    }
}

/// Base URL of the Sumo REST API for an environment.
pub fn base_url_for(env: &str) -> String {
    if env == LOCALHOST {
        "http://localhost:8084/api/v1".to_string()
    } else {
        format!("https://main-sumo-{env}.radix.equinor.com/api/v1")
    }
}

/// Authority URL for the Sumo tenant.
pub fn default_authority() -> String {
    format!("{AUTHORITY_HOST_URI}/{TENANT_ID}")
}

/// Client configuration, immutable once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Environment name
    pub env: String,
    /// API base URL, without trailing slash
    pub base_url: String,
    /// App registration for token acquisition
    pub registration: AppRegistration,
    /// Identity provider authority
    pub authority: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry policy shared by every request
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Configuration for a known environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the environment has no built-in registration.
    pub fn for_env(env: &str) -> Result<Self> {
        let registration = registration_for(env)
            .ok_or_else(|| Error::Config(format!("Invalid environment: {env}")))?;
        Ok(Self::with_registration(env, registration))
    }

    /// Configuration for any environment with an explicit registration.
    pub fn with_registration(env: &str, registration: AppRegistration) -> Self {
        Self {
            env: env.to_string(),
            base_url: base_url_for(env),
            registration,
            authority: default_authority(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Logging verbosity accepted by the login command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verbosity {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[default]
    #[value(name = "CRITICAL")]
    Critical,
}

impl Verbosity {
    /// Matching tracing level; CRITICAL has no own level and maps to ERROR.
    pub fn level(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error | Self::Critical => tracing::Level::ERROR,
        }
    }
}

/// How the login command obtains a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Interactive,
    DeviceCode,
    Silent,
}

/// Command-line arguments for the login command.
#[derive(Parser, Debug, Clone)]
#[command(name = "sumo-login")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Login to Sumo on Azure")]
pub struct Args {
    /// Environment to log into
    #[arg(short, long, default_value = "dev", env = "SUMO_ENV")]
    pub env: String,

    /// Set the verbosity level
    #[arg(short, long, value_enum, ignore_case = true, default_value = "CRITICAL")]
    pub verbosity: Verbosity,

    /// Login interactively (the default)
    #[arg(short, long)]
    pub interactive: bool,

    /// Login with device-code
    #[arg(short, long)]
    pub devicecode: bool,

    /// Print access token
    #[arg(short = 'p', long = "print")]
    pub print_token: bool,

    /// Attempt to acquire a token silently
    #[arg(short, long)]
    pub silent: bool,

    /// App registration client id (required outside built-in environments)
    #[arg(long, env = "SUMO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// App registration resource id (required outside built-in environments)
    #[arg(long, env = "SUMO_RESOURCE_ID")]
    pub resource_id: Option<String>,
}

impl Args {
    /// Login mode implied by the flags; silent wins over everything.
    pub fn login_mode(&self) -> LoginMode {
        if self.silent {
            LoginMode::Silent
        } else if self.devicecode {
            LoginMode::DeviceCode
        } else {
            LoginMode::Interactive
        }
    }

    /// Whether the token should be printed; never in silent mode.
    pub fn should_print_token(&self) -> bool {
        self.print_token && !self.silent
    }

    /// Client configuration for the selected environment.
    pub fn client_config(&self) -> Result<ClientConfig> {
        match (&self.client_id, &self.resource_id) {
            (Some(client_id), Some(resource_id)) => Ok(ClientConfig::with_registration(
                &self.env,
                AppRegistration {
                    client_id: client_id.clone(),
                    resource_id: resource_id.clone(),
                },
            )),
            _ => ClientConfig::for_env(&self.env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["sumo-login"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_base_urls() {
        assert_eq!(base_url_for("localhost"), "http://localhost:8084/api/v1");
        assert_eq!(
            base_url_for("dev"),
            "https://main-sumo-dev.radix.equinor.com/api/v1"
        );
        assert_eq!(
            base_url_for("prod"),
            "https://main-sumo-prod.radix.equinor.com/api/v1"
        );
    }

    #[test]
    fn test_config_for_known_env() {
        let config = ClientConfig::for_env("dev").unwrap();
        assert_eq!(config.env, "dev");
        assert_eq!(config.registration.client_id, DEV_CLIENT_ID);
        assert_eq!(config.registration.resource_id, DEV_RESOURCE_ID);
        assert_eq!(
            config.authority,
            "https://login.microsoftonline.com/3aa4a235-b6e2-48d5-9195-7fcf05b459b0"
        );
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.retry.max_attempts, 6);
    }

    #[test]
    fn test_localhost_reuses_dev_registration() {
        let config = ClientConfig::for_env("localhost").unwrap();
        assert_eq!(config.base_url, "http://localhost:8084/api/v1");
        assert_eq!(config.registration, registration_for("dev").unwrap());
    }

    #[test]
    fn test_unknown_env_rejected() {
        let err = ClientConfig::for_env("nowhere").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("Invalid environment: nowhere"));
    }

    #[test]
    fn test_args_defaults() {
        let parsed = args(&[]);
        assert_eq!(parsed.env, "dev");
        assert_eq!(parsed.verbosity, Verbosity::Critical);
        assert_eq!(parsed.login_mode(), LoginMode::Interactive);
        assert!(!parsed.should_print_token());
    }

    #[test]
    fn test_args_modes() {
        assert_eq!(args(&["-d"]).login_mode(), LoginMode::DeviceCode);
        assert_eq!(args(&["-s", "-d"]).login_mode(), LoginMode::Silent);
        assert!(!args(&["-s", "-p"]).should_print_token());
        assert!(args(&["--print"]).should_print_token());
    }

    #[test]
    fn test_args_verbosity_case_insensitive() {
        assert_eq!(args(&["-v", "debug"]).verbosity, Verbosity::Debug);
        assert_eq!(args(&["--verbosity", "WARNING"]).verbosity.level(), tracing::Level::WARN);
        assert_eq!(Verbosity::Critical.level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_args_to_config_with_overrides() {
        let parsed = args(&[
            "--env",
            "prod",
            "--client-id",
            "client-123",
            "--resource-id",
            "resource-456",
        ]);
        let config = parsed.client_config().unwrap();

        assert_eq!(config.base_url, "https://main-sumo-prod.radix.equinor.com/api/v1");
        assert_eq!(config.registration.client_id, "client-123");
        assert_eq!(config.registration.resource_id, "resource-456");
    }

    #[test]
    fn test_verbosity_serialization() {
        let json = serde_json::to_string(&Verbosity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }
}
