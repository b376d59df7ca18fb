use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::warn;

const APP_DIR_NAME: &str = "waveline-sync";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsKey {
    Server,
    ApiKey,
    Roots,
    Connected,
}

impl SettingsKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::ApiKey => "key",
            Self::Roots => "roots",
            Self::Connected => "connected",
        }
    }
}

/// String key-value store the engine keeps its state in.
pub trait SettingsStore: Send {
    fn get_string(&self, key: SettingsKey) -> Option<String>;
    fn set_string(&mut self, key: SettingsKey, value: String);
    fn remove(&mut self, key: SettingsKey);
    fn persist(&mut self) -> Result<(), SettingsError>;
}

/// Settings kept as a flat JSON object on disk.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileSettings {
    /// Opens `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings file");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read settings file");
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_string(&self, key: SettingsKey) -> Option<String> {
        self.values.get(key.as_str()).cloned()
    }

    fn set_string(&mut self, key: SettingsKey, value: String) {
        self.values.insert(key.as_str().to_string(), value);
    }

    fn remove(&mut self, key: SettingsKey) {
        self.values.remove(key.as_str());
    }

    fn persist(&mut self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(&self.values)?;
        let partial = self.path.with_extension("json.partial");
        std::fs::write(&partial, encoded)?;
        std::fs::rename(partial, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, String>,
    persisted: usize,
    fail_persist: bool,
}

/// In-process store. Clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySettings {
    pub fn with(key: SettingsKey, value: &str) -> Self {
        let store = Self::default();
        store
            .lock()
            .values
            .insert(key.as_str().to_string(), value.to_string());
        store
    }

    /// Makes every `persist()` fail.
    pub fn failing(self) -> Self {
        self.lock().fail_persist = true;
        self
    }

    pub fn persist_count(&self) -> usize {
        self.lock().persisted
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, key: SettingsKey) -> Option<String> {
        self.lock().values.get(key.as_str()).cloned()
    }

    fn set_string(&mut self, key: SettingsKey, value: String) {
        self.lock().values.insert(key.as_str().to_string(), value);
    }

    fn remove(&mut self, key: SettingsKey) {
        self.lock().values.remove(key.as_str());
    }

    fn persist(&mut self) -> Result<(), SettingsError> {
        let mut inner = self.lock();
        if inner.fail_persist {
            return Err(SettingsError::Io(std::io::Error::other(
                "settings store is read-only",
            )));
        }
        inner.persisted += 1;
        Ok(())
    }
}

/// Where the server lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub server: String,
    pub api_key: String,
}

/// Returns the stored connection when the app is marked connected and both
/// server and key are present.
pub fn load_connection(store: &dyn SettingsStore) -> Option<Connection> {
    let connected = store
        .get_string(SettingsKey::Connected)
        .is_some_and(|value| value == "true");
    if !connected {
        return None;
    }
    let server = store.get_string(SettingsKey::Server).filter(|v| !v.is_empty())?;
    let api_key = store.get_string(SettingsKey::ApiKey).filter(|v| !v.is_empty())?;
    Some(Connection { server, api_key })
}

pub fn save_connection(
    store: &mut dyn SettingsStore,
    connection: &Connection,
) -> Result<(), SettingsError> {
    store.set_string(SettingsKey::Server, connection.server.clone());
    store.set_string(SettingsKey::ApiKey, connection.api_key.clone());
    store.set_string(SettingsKey::Connected, "true".to_string());
    store.persist()
}

/// Marks the app disconnected and drops the API key. Watch roots are cleared
/// separately by their registry.
pub fn clear_connection(store: &mut dyn SettingsStore) -> Result<(), SettingsError> {
    store.set_string(SettingsKey::Connected, "false".to_string());
    store.remove(SettingsKey::ApiKey);
    store.persist()
}

pub fn default_settings_path() -> PathBuf {
    std::env::var("WAVELINE_CONFIG_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR_NAME)
        })
        .join(SETTINGS_FILE_NAME)
}
