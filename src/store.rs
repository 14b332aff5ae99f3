use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::SessionError;

/// Keys persisted by the token lifecycle. The string forms match the
/// session-storage keys the browser client used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Verifier,
    AccessToken,
    RefreshToken,
    ExpiresAt,
}

impl StoreKey {
    pub const ALL: [StoreKey; 4] = [
        StoreKey::Verifier,
        StoreKey::AccessToken,
        StoreKey::RefreshToken,
        StoreKey::ExpiresAt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::Verifier => "verifier",
            StoreKey::AccessToken => "access_token",
            StoreKey::RefreshToken => "refresh_token",
            StoreKey::ExpiresAt => "expires_at",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        StoreKey::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Scoped key/value persistence owned by the token lifecycle manager.
///
/// Implementations must be cheap to call: the manager reads the store on
/// every `get_valid_token()` call.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Option<String>;
    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: StoreKey) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Converts an instant into the epoch-millisecond text stored under `expires_at`.
pub fn encode_instant(instant: SystemTime) -> String {
    instant
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
        .to_string()
}

/// Parses stored epoch-millisecond text. Garbage reads as the epoch, i.e. expired.
pub fn decode_instant(text: &str) -> SystemTime {
    let millis = text.trim().parse::<u64>().unwrap_or(0);
    UNIX_EPOCH + Duration::from_millis(millis)
}

/// Process-lifetime store, the equivalent of a browser tab's session storage.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(&key).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.clear();
        Ok(())
    }
}

/// JSON-file backed store for non-browser targets.
///
/// The whole map is rewritten on every mutation; reads are served from memory.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl FileTokenStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashMap::new();

        match fs::read(&path) {
            Ok(bytes) => {
                let raw: HashMap<String, String> = serde_json::from_slice(&bytes)?;
                for (name, value) in raw {
                    match StoreKey::from_name(&name) {
                        Some(key) => {
                            entries.insert(key, value);
                        }
                        None => warn!(key = %name, "Ignoring unknown key in token file"),
                    }
                }
                debug!(path = %path.display(), count = entries.len(), "Loaded token file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No token file yet, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<StoreKey, String>) -> Result<(), SessionError> {
        let raw: HashMap<&str, &str> = entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let json = serde_json::to_vec_pretty(&raw)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut HashMap<StoreKey, String>),
    {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut entries);
        self.persist(&entries)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(&key).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        self.mutate(|entries| {
            entries.insert(key, value.to_string());
        })
    }

    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        self.mutate(|entries| {
            entries.remove(&key);
        })
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.mutate(HashMap::clear)
    }
}
