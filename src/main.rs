//! sumo-login - log in to a Sumo environment and cache the token.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use sumo_wrapper::auth::AuthOptions;
use sumo_wrapper::config::{Args, LoginMode};
use sumo_wrapper::error::{Error, Result};
use sumo_wrapper::sdk::SumoClient;
use sumo_wrapper::VERSION;

/// Name of this machine.
fn hostname() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|h| !h.is_empty())
}

/// Whether a Chromium profile lock belongs to another host, in which case a
/// browser cannot be opened from here.
fn chromium_locked_elsewhere(home: &Path, host: &str) -> bool {
    let lock = home.join(".config/chromium/SingletonLock");
    let is_link = std::fs::symlink_metadata(&lock)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if !is_link {
        return false;
    }
    std::fs::read_link(&lock)
        .map(|target| !target.to_string_lossy().contains(host))
        .unwrap_or(false)
}

fn resolve_mode(args: &Args) -> LoginMode {
    let mode = args.login_mode();
    if mode != LoginMode::Interactive {
        return mode;
    }
    let locked = match (dirs::home_dir(), hostname()) {
        (Some(home), Some(host)) => chromium_locked_elsewhere(&home, &host),
        _ => false,
    };
    if locked {
        info!("Chromium is locked by another host, falling back to device code login");
        LoginMode::DeviceCode
    } else {
        mode
    }
}

fn auth_options(mode: LoginMode) -> AuthOptions {
    AuthOptions {
        interactive: mode == LoginMode::Interactive,
        devicecode: mode == LoginMode::DeviceCode,
        allow_login: mode != LoginMode::Silent,
        ..AuthOptions::default()
    }
}

async fn login(args: &Args, mode: LoginMode) -> Result<Option<String>> {
    let config = args.client_config()?;
    let client = SumoClient::connect(config, auth_options(mode)).await?;
    tokio::task::spawn_blocking(move || client.authenticate())
        .await
        .map_err(|e| Error::Internal(format!("Token task failed: {}", e)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG, when set, overrides the verbosity flag
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.verbosity.level()).into())
        .from_env_lossy();
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    debug!("sumo-login v{}", VERSION);
    debug!("env is {}", args.env);

    let mode = resolve_mode(&args);
    if mode != LoginMode::Silent {
        println!("Login to Sumo environment: {}", args.env);
    }

    let token = match login(&args, mode).await {
        Ok(token) => token,
        Err(e) => {
            error!("Login failed: {}", e);
            if mode != LoginMode::Silent {
                eprintln!("Failed login to Sumo environment: {}: {}", args.env, e);
            }
            return ExitCode::FAILURE;
        }
    };

    if mode == LoginMode::Silent {
        return if token.is_some() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    if args.should_print_token() {
        if let Some(token) = &token {
            println!("TOKEN: {token}");
        }
    }

    match token {
        Some(_) => {
            println!("Successfully logged in to Sumo environment: {}", args.env);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("Failed login to Sumo environment: {}", args.env);
            ExitCode::FAILURE
        }
    }
}
