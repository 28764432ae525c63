//! API credential handling and its durable key-value store.
//!
//! The credential only ever travels to the image service it belongs to.
//! On disk it lives in plain TOML inside the user's config directory,
//! readable by the owner only on Unix.

use crate::error::{Result, TimeLensError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key the Gemini credential is stored under.
pub const GEMINI_CREDENTIAL_KEY: &str = "gemini_api_key";

const CREDENTIALS_FILE: &str = "credentials.toml";

/// A user-supplied API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Trims `value`; returns `None` when nothing is left.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The raw key, for handing to the image service.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Durable key-value storage for credentials.
pub trait CredentialStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<Credential>>;

    /// Writes `credential` under `key`, replacing any previous value.
    fn store(&self, key: &str, credential: &Credential) -> Result<()>;

    /// Deletes the value under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<BTreeMap<String, Credential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Credential>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: &str) -> Result<Option<Credential>> {
        Ok(self.entries().get(key).cloned())
    }

    fn store(&self, key: &str, credential: &Credential) -> Result<()> {
        self.entries().insert(key.to_string(), credential.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// TOML-file store, one `key = "value"` line per credential.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Uses the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `credentials.toml` in the default config directory
    /// (`~/.config/timelens/` on Linux).
    pub fn default_location() -> Result<Self> {
        let dir = crate::config::config_dir()
            .ok_or_else(|| TimeLensError::Config("cannot find config directory".into()))?;
        Ok(Self::new(dir.join(CREDENTIALS_FILE)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        toml::from_str(&content).map_err(|e| {
            TimeLensError::Config(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(entries)
            .map_err(|e| TimeLensError::Config(format!("failed to serialize credentials: {e}")))?;
        write_private(&self.path, content.as_bytes())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: &str) -> Result<Option<Credential>> {
        Ok(self.read_all()?.get(key).and_then(Credential::new))
    }

    fn store(&self, key: &str, credential: &Credential) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), credential.expose().to_string());
        self.write_all(&entries)?;
        tracing::debug!(key, path = %self.path.display(), "stored credential");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        if entries.is_empty() {
            fs::remove_file(&self.path)?;
        } else {
            self.write_all(&entries)?;
        }
        tracing::debug!(key, "removed credential");
        Ok(())
    }
}

/// Writes `bytes` to `path`, owner read/write only from the first byte on.
#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

/// Reads the credential for `key`, falling back to the env var `env_var`.
pub fn resolve_credential(
    store: &dyn CredentialStore,
    key: &str,
    env_var: &str,
) -> Result<Option<Credential>> {
    if let Some(credential) = store.load(key)? {
        return Ok(Some(credential));
    }
    Ok(std::env::var(env_var).ok().and_then(Credential::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_trims_and_rejects_blank() {
        assert_eq!(Credential::new("  abc \n").unwrap().expose(), "abc");
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   ").is_none());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("AIza-secret").unwrap();
        assert!(!format!("{credential:?}").contains("secret"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        let key = Credential::new("abc").unwrap();
        store.store(GEMINI_CREDENTIAL_KEY, &key).unwrap();
        assert_eq!(store.load(GEMINI_CREDENTIAL_KEY).unwrap(), Some(key));
        store.remove(GEMINI_CREDENTIAL_KEY).unwrap();
        assert_eq!(store.load(GEMINI_CREDENTIAL_KEY).unwrap(), None);
        store.remove(GEMINI_CREDENTIAL_KEY).unwrap();
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested").join(CREDENTIALS_FILE));

        assert_eq!(store.load(GEMINI_CREDENTIAL_KEY).unwrap(), None);

        store
            .store(GEMINI_CREDENTIAL_KEY, &Credential::new("abc").unwrap())
            .unwrap();
        store
            .store("openai_api_key", &Credential::new("sk-xyz").unwrap())
            .unwrap();

        let reopened = FileCredentialStore::new(store.path());
        assert_eq!(
            reopened.load(GEMINI_CREDENTIAL_KEY).unwrap().unwrap().expose(),
            "abc"
        );

        reopened.remove(GEMINI_CREDENTIAL_KEY).unwrap();
        assert_eq!(reopened.load(GEMINI_CREDENTIAL_KEY).unwrap(), None);
        assert!(reopened.load("openai_api_key").unwrap().is_some());

        reopened.remove("openai_api_key").unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(CREDENTIALS_FILE));
        store
            .store(GEMINI_CREDENTIAL_KEY, &Credential::new("abc").unwrap())
            .unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CREDENTIALS_FILE);
        fs::write(&path, "openai_api_key = \"sk-old\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileCredentialStore::new(&path);
        store
            .store(GEMINI_CREDENTIAL_KEY, &Credential::new("abc").unwrap())
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(store.load("openai_api_key").unwrap().is_some());
    }

    #[test]
    fn test_file_store_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CREDENTIALS_FILE);
        fs::write(&path, "not = [valid").unwrap();
        let store = FileCredentialStore::new(&path);
        assert!(matches!(
            store.load(GEMINI_CREDENTIAL_KEY),
            Err(TimeLensError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_store_over_env() {
        let store = MemoryCredentialStore::new();
        store
            .store(GEMINI_CREDENTIAL_KEY, &Credential::new("stored").unwrap())
            .unwrap();
        let resolved = resolve_credential(&store, GEMINI_CREDENTIAL_KEY, "TIMELENS_TEST_UNSET_VAR")
            .unwrap()
            .unwrap();
        assert_eq!(resolved.expose(), "stored");

        let empty = MemoryCredentialStore::new();
        assert!(
            resolve_credential(&empty, GEMINI_CREDENTIAL_KEY, "TIMELENS_TEST_UNSET_VAR")
                .unwrap()
                .is_none()
        );
    }
}
