use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SERVICE_NAME: &str = "taskdeck";

/// Keyring account under which the credential document is stored
const KEYRING_ACCOUNT: &str = "session-tokens";

/// Credential file name in cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// The access/refresh token slots. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "access_token", default)]
    pub access: Option<String>,
    #[serde(rename = "refresh_token", default)]
    pub refresh: Option<String>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Durable storage for a `CredentialPair`.
///
/// Implementations write the whole pair in one operation so a crash can
/// never leave one slot updated and the other stale.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<CredentialPair>;
    fn save(&self, pair: &CredentialPair) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// JSON document in the cache directory, replaced atomically via rename.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: cache_dir.join(CREDENTIALS_FILE),
        }
    }
}

/// Write `contents` to a fresh file readable only by the current user.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    // A leftover temp file keeps its old mode; start from scratch
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<CredentialPair> {
        if !self.path.exists() {
            return Ok(CredentialPair::default());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read credentials file")?;
        serde_json::from_str(&contents).context("Failed to parse credentials file")
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(pair)?;
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, contents.as_bytes()).context("Failed to write credentials file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace credentials file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove credentials file")?;
        }
        Ok(())
    }
}

/// Both slots as a single secret in the OS keychain.
pub struct KeyringBackend {
    account: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self {
            account: KEYRING_ACCOUNT.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<CredentialPair> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                serde_json::from_str(&secret).context("Failed to parse credentials from keychain")
            }
            Err(keyring::Error::NoEntry) => Ok(CredentialPair::default()),
            Err(e) => Err(e).context("Failed to retrieve credentials from keychain"),
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let secret = serde_json::to_string(pair)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store credentials in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credentials from keychain"),
        }
    }
}

/// Non-durable backend for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryBackend {
    pair: Mutex<CredentialPair>,
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<CredentialPair> {
        Ok(self.pair.lock().map(|p| p.clone()).unwrap_or_default())
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Ok(mut slot) = self.pair.lock() {
            *slot = pair.clone();
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save(&CredentialPair::default())
    }
}

/// Process-wide holder of the current credential pair.
///
/// Reads are served from memory; every mutation is written through to the
/// backend. Mutation is crate-private: only the session controller changes
/// credentials.
pub struct CredentialStore {
    pair: Mutex<CredentialPair>,
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    /// Open the store, loading any persisted pair from `backend`.
    pub fn open(backend: Arc<dyn CredentialBackend>) -> Self {
        let pair = backend.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load stored credentials, starting signed out");
            CredentialPair::default()
        });
        debug!(
            has_access = pair.access.is_some(),
            has_refresh = pair.refresh.is_some(),
            "Credential store opened"
        );
        Self {
            pair: Mutex::new(pair),
            backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryBackend::default()))
    }

    fn lock(&self) -> MutexGuard<'_, CredentialPair> {
        // A poisoned lock still holds a whole pair; writes replace it in one step.
        self.pair.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> CredentialPair {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh.clone()
    }

    /// Authenticated iff an access credential is present.
    pub fn is_authenticated(&self) -> bool {
        self.lock().access.is_some()
    }

    pub(crate) fn set(&self, pair: CredentialPair) {
        let mut slot = self.lock();
        if let Err(e) = self.backend.save(&pair) {
            warn!(error = %e, "Failed to persist credentials");
        }
        *slot = pair;
    }

    pub(crate) fn set_access(&self, access: String) {
        let mut slot = self.lock();
        let updated = CredentialPair {
            access: Some(access),
            refresh: slot.refresh.clone(),
        };
        if let Err(e) = self.backend.save(&updated) {
            warn!(error = %e, "Failed to persist refreshed access token");
        }
        *slot = updated;
    }

    pub(crate) fn clear(&self) {
        let mut slot = self.lock();
        if let Err(e) = self.backend.clear() {
            warn!(error = %e, "Failed to remove stored credentials");
        }
        *slot = CredentialPair::default();
    }
}
