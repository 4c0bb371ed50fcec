//! Browser login with a one-shot local redirect listener.

use chrono::Local;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info};

use super::public_client::PublicClient;
use super::{CredentialKind, TokenSource};
use crate::error::{Error, Result};

/// How long the user gets to complete the browser login.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(7 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long an accepted connection may stay silent before it is dropped.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(2);

const CALLBACK_PAGE: &str = "<html><body>Authentication completed. You can close this window now.</body></html>";

/// Query parameters of the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// Parse the request line of the redirect hitting the local listener.
pub fn parse_callback(request_line: &str) -> Result<CallbackParams> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::Auth("Malformed login callback".to_string()))?;
    let url = oauth2::url::Url::parse(&format!("http://localhost{target}"))?;

    let mut code = None;
    let mut state = None;
    let mut failure = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => failure = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(failure) = failure {
        return Err(Error::Auth(match description {
            Some(d) => format!("{failure}: {d}"),
            None => failure,
        }));
    }
    match (code, state) {
        (Some(code), Some(state)) => Ok(CallbackParams { code, state }),
        _ => Err(Error::Auth(
            "Login callback is missing code or state".to_string(),
        )),
    }
}

/// Open `url` in the system browser.
#[allow(unreachable_code)]
pub fn open_browser(url: &str) -> Result<()> {
    let spawn_err = |e: std::io::Error| Error::Auth(format!("Failed to open browser: {e}"));

    #[cfg(target_os = "windows")]
    {
        Command::new("rundll32.exe")
            .arg("url.dll,FileProtocolHandler")
            .arg(url)
            .spawn()
            .map_err(spawn_err)?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open").arg(url).spawn().map_err(spawn_err)?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open").arg(url).spawn().map_err(spawn_err)?;
        return Ok(());
    }

    Err(Error::Auth(
        "Opening a browser is unsupported on this platform".to_string(),
    ))
}

/// Whether a request line is the authorization redirect rather than a
/// favicon fetch or some other request to the listener.
fn is_callback(request_line: &str) -> bool {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return false;
    };
    oauth2::url::Url::parse(&format!("http://localhost{target}"))
        .map(|url| url.query_pairs().any(|(k, _)| k == "code" || k == "error"))
        .unwrap_or(false)
}

/// Read the request line of an accepted connection, `None` unless it is the
/// callback.
fn read_callback(stream: &TcpStream) -> Option<String> {
    let setup = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(CONNECTION_READ_TIMEOUT)));
    if let Err(e) = setup {
        debug!("Dropping callback connection: {}", e);
        return None;
    }

    let mut line = String::new();
    match BufReader::new(stream).read_line(&mut line) {
        Ok(_) if is_callback(&line) => Some(line),
        Ok(_) => {
            debug!("Ignoring non-callback request {:?}", line.trim_end());
            None
        }
        Err(e) => {
            debug!("Dropping silent callback connection: {}", e);
            None
        }
    }
}

/// Accept connections until the callback arrives or `deadline` passes.
///
/// Browsers open speculative connections that send nothing, and request
/// favicons on the same origin; both are skipped.
fn wait_for_callback(listener: &TcpListener, deadline: Instant) -> Result<(TcpStream, String)> {
    listener.set_nonblocking(true)?;
    loop {
        if Instant::now() >= deadline {
            return Err(Error::Auth("Timed out waiting for login".to_string()));
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Some(line) = read_callback(&stream) {
                    return Ok((stream, line));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Compare the returned state with the expected one in constant time.
fn state_matches(received: &str, expected: &str) -> bool {
    received.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn respond(mut stream: TcpStream) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        CALLBACK_PAGE.len(),
        CALLBACK_PAGE
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("Failed to answer login callback: {}", e);
    }
}

/// Cache-backed credential that logs in through the system browser.
pub struct InteractiveCredential {
    client: PublicClient,
}

impl InteractiveCredential {
    /// Wrap `client`, running a visible login when the cache has no usable
    /// token and `allow_login` is set.
    pub fn new(client: PublicClient, allow_login: bool) -> Result<Self> {
        let credential = Self { client };
        if allow_login && credential.client.acquire_token_silent()?.is_none() {
            credential.login();
        }
        Ok(credential)
    }

    /// Run the browser login. Failures are logged and leave the credential
    /// without a token; the return value tells whether it succeeded.
    pub fn login(&self) -> bool {
        let deadline = Local::now() + chrono::Duration::seconds(LOGIN_TIMEOUT.as_secs() as i64);
        eprintln!(
            "\n\n \x1b[31m NOTE! \x1b[0m Please login to Equinor Azure to enable Sumo access: \
             we opened a login web-page for you in your browser.\
             \nYou should complete your login within {} minutes, that is before {}",
            LOGIN_TIMEOUT.as_secs() / 60,
            deadline.format("%H:%M:%S")
        );

        match self.run_login() {
            Ok(_) => {
                info!("Equinor Azure login for Sumo access was successful");
                true
            }
            Err(e) => {
                error!(
                    "Failed Equinor Azure login for Sumo access, one possible reason is timeout: {}",
                    e
                );
                false
            }
        }
    }

    fn run_login(&self) -> Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let redirect = format!("http://localhost:{port}");
        let (url, csrf, verifier, client) = self.client.authorization_request(&redirect)?;

        debug!("Waiting for login callback on {}", redirect);
        if let Err(e) = open_browser(url.as_str()) {
            eprintln!("{e}\nOpen this address to continue: {url}");
        }

        let (stream, request_line) =
            wait_for_callback(&listener, Instant::now() + LOGIN_TIMEOUT)?;
        let params = parse_callback(&request_line);
        respond(stream);
        let params = params?;

        if !state_matches(&params.state, csrf.secret()) {
            return Err(Error::Auth("Login callback state mismatch".to_string()));
        }
        let token = self
            .client
            .acquire_token_by_auth_code(&client, params.code, verifier)?;
        if let Some(path) = self.client.cache().location() {
            super::cache::protect(path)?;
        }
        Ok(token)
    }
}

impl TokenSource for InteractiveCredential {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Interactive
    }

    fn get_token(&self) -> Result<String> {
        self.client
            .acquire_token_silent()?
            .ok_or_else(|| Error::Auth("Not logged in; run the interactive login".to_string()))
    }
}
