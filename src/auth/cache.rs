//! Token cache store.
//!
//! Cache-backed credentials keep a JSON document under `~/.sumo/`, one file per
//! resource. On Linux the document is stored as a plain file; elsewhere it is
//! kept in the OS keyring and the file only marks its presence. Files are
//! owner read-write (`0600`) inside an owner-only directory (`0700`).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sdk::retry::{retry_blocking, RetryPolicy};

/// Directory under the home directory holding all Sumo credentials.
pub const CACHE_DIR_NAME: &str = ".sumo";

/// Suffix of interactive/device-code token caches.
pub const TOKEN_SUFFIX: &str = ".token";

/// Suffix of pre-shared static token files.
pub const SHARED_KEY_SUFFIX: &str = ".sharedkey";

/// Seconds before expiry at which a cached access token stops being served.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Get the Sumo credential directory.
pub fn cache_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(CACHE_DIR_NAME))
        .ok_or_else(|| Error::Cache("Unable to locate home directory".to_string()))
}

/// Path of the credential file for a resource.
pub fn token_path(resource_id: &str, suffix: &str) -> Result<PathBuf> {
    Ok(cache_dir()?.join(format!("{resource_id}{suffix}")))
}

/// Force owner-only permissions on a credential file and its directory.
#[cfg(unix)]
pub fn protect(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    if mode != 0o600 {
        debug!("Restricting {} from {:o} to 600", path.display(), mode);
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        let mode = fs::metadata(dir)?.permissions().mode() & 0o777;
        if mode != 0o700 {
            debug!("Restricting {} from {:o} to 700", dir.display(), mode);
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

/// Permissions are managed through ACLs here; nothing to enforce.
#[cfg(not(unix))]
pub fn protect(_path: &Path) -> Result<()> {
    Ok(())
}

/// Write a credential file in one buffered write under a `077` umask.
#[cfg(unix)]
pub(crate) fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

    // SAFETY: umask only swaps the process file-mode creation mask.
    let previous = unsafe { libc::umask(0o077) };
    let restore = scopeguard::guard(previous, |mask| {
        // SAFETY: as above, restoring the saved mask.
        unsafe {
            libc::umask(mask);
        }
    });

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.flush()?;
    drop(file);
    drop(restore);

    protect(path)
}

#[cfg(not(unix))]
pub(crate) fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}

/// Storage backend for a serialized token cache.
pub trait CachePersistence: Send + Sync {
    /// Load the stored document, `None` when nothing is stored yet.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored document.
    fn save(&self, contents: &str) -> Result<()>;

    /// File backing (or marking) this cache.
    fn location(&self) -> &Path;
}

/// Plain file persistence.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CachePersistence for FilePersistence {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        protect(&self.path)?;
        let contents = fs::read_to_string(&self.path)?;
        Ok((!contents.trim().is_empty()).then_some(contents))
    }

    fn save(&self, contents: &str) -> Result<()> {
        write_private(&self.path, contents.as_bytes())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Keyring-backed persistence for platforms with an OS secret store.
#[cfg(not(target_os = "linux"))]
pub struct EncryptedPersistence {
    path: PathBuf,
    entry: keyring::Entry,
}

#[cfg(not(target_os = "linux"))]
const KEYRING_SERVICE: &str = "sumo";

#[cfg(not(target_os = "linux"))]
fn keyring_error(e: keyring::Error) -> Error {
    Error::Cache(format!("Keyring access failed: {e}"))
}

#[cfg(not(target_os = "linux"))]
impl EncryptedPersistence {
    /// Open the keyring entry for `path`, migrating a plaintext cache left there.
    pub fn open(path: PathBuf) -> Result<Self> {
        let account = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry = keyring::Entry::new(KEYRING_SERVICE, &account).map_err(keyring_error)?;
        let persistence = Self { path, entry };
        persistence.migrate_plaintext()?;
        Ok(persistence)
    }

    fn migrate_plaintext(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let plain = fs::read_to_string(&self.path)?;
        if plain.trim().is_empty() {
            return Ok(());
        }
        match self.entry.get_password() {
            Ok(_) => {}
            Err(keyring::Error::NoEntry) => {
                debug!("Encrypting plaintext token cache {}", self.path.display());
                self.entry.set_password(&plain).map_err(keyring_error)?;
            }
            Err(e) => return Err(keyring_error(e)),
        }
        write_private(&self.path, b"")
    }
}

#[cfg(not(target_os = "linux"))]
impl CachePersistence for EncryptedPersistence {
    fn load(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(contents) => Ok(Some(contents)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_error(e)),
        }
    }

    fn save(&self, contents: &str) -> Result<()> {
        self.entry.set_password(contents).map_err(keyring_error)?;
        if !self.path.exists() {
            write_private(&self.path, b"")?;
        }
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// One cached token set, keyed by client id and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    pub client_id: String,
    pub scope: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry, unix seconds
    pub expires_at: i64,
}

impl CachedAccount {
    /// Whether the access token can still be served at `now`.
    pub fn is_fresh(&self, now: i64) -> bool {
        now < self.expires_at - EXPIRY_BUFFER_SECS
    }
}

/// Serialized cache document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheContents {
    #[serde(default)]
    pub accounts: Vec<CachedAccount>,
}

/// In-memory view of a token cache, optionally persisted.
///
/// Entries are only ever replaced whole.
pub struct CacheHandle {
    persistence: Option<Box<dyn CachePersistence>>,
    contents: Mutex<CacheContents>,
}

impl CacheHandle {
    /// Cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            persistence: None,
            contents: Mutex::new(CacheContents::default()),
        }
    }

    /// Load a cache from persistence. An unreadable document starts empty.
    pub fn open(persistence: Box<dyn CachePersistence>) -> Result<Self> {
        let contents = match persistence.load()? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(
                    "Ignoring unreadable token cache {}: {}",
                    persistence.location().display(),
                    e
                );
                CacheContents::default()
            }),
            None => CacheContents::default(),
        };
        Ok(Self {
            persistence: Some(persistence),
            contents: Mutex::new(contents),
        })
    }

    /// Backing file, if persisted.
    pub fn location(&self) -> Option<&Path> {
        self.persistence.as_deref().map(|p| p.location())
    }

    /// Cached account for a client and scope.
    pub fn find(&self, client_id: &str, scope: &str) -> Option<CachedAccount> {
        self.contents
            .lock()
            .accounts
            .iter()
            .find(|a| a.client_id == client_id && a.scope == scope)
            .cloned()
    }

    /// Replace (or add) the account for its client and scope, then persist.
    pub fn store(&self, account: CachedAccount) -> Result<()> {
        let snapshot = {
            let mut contents = self.contents.lock();
            contents
                .accounts
                .retain(|a| !(a.client_id == account.client_id && a.scope == account.scope));
            contents.accounts.push(account);
            serde_json::to_string(&*contents)?
        };
        if let Some(persistence) = &self.persistence {
            persistence.save(&snapshot)?;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn build_persistence(path: PathBuf) -> Result<Box<dyn CachePersistence>> {
    Ok(Box::new(FilePersistence::new(path)))
}

#[cfg(not(target_os = "linux"))]
fn build_persistence(path: PathBuf) -> Result<Box<dyn CachePersistence>> {
    Ok(Box::new(EncryptedPersistence::open(path)?))
}

/// Open the persisted cache for `path`, retrying on any failure.
///
/// Several processes logging in at once can race on the file; each failed
/// attempt is retried under `policy` and the last error is returned once the
/// budget is spent.
pub fn open_cache(path: &Path, policy: &RetryPolicy) -> Result<CacheHandle> {
    retry_blocking(
        || CacheHandle::open(build_persistence(path.to_path_buf())?),
        |_: &Error| true,
        |_: &CacheHandle| false,
        policy,
    )
}

/// Open the persisted cache of a resource.
pub fn get_cache(resource_id: &str, suffix: &str, policy: &RetryPolicy) -> Result<CacheHandle> {
    open_cache(&token_path(resource_id, suffix)?, policy)
}
