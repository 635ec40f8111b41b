//! Configuration storage abstraction.
//!
//! Plugin configuration is persisted as one JSON document per plugin id.
//! Two implementations are provided:
//! - `FileConfigStorage`: `<root>/plugin-config-data/<plugin-id>.json`,
//!   the layout used by the Node.js SignalK server
//! - `MemoryConfigStorage`: volatile, for tests and embedding
//!
//! All methods are synchronous; callers on an async runtime treat them as
//! short blocking operations.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Errors that can occur during configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested configuration was not found.
    NotFound(String),
    /// Failed to read configuration.
    ReadError(String),
    /// Failed to write configuration.
    WriteError(String),
    /// Configuration data is invalid.
    InvalidData(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Configuration not found: {}", key),
            ConfigError::ReadError(msg) => write!(f, "Read error: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Write error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Abstract plugin configuration storage.
pub trait ConfigStorage: Send + Sync {
    /// Load configuration for a specific plugin.
    fn load_plugin_config(&self, plugin_id: &str) -> Result<Value, ConfigError>;

    /// Save configuration for a specific plugin, replacing what was there.
    fn save_plugin_config(&self, plugin_id: &str, config: &Value) -> Result<(), ConfigError>;

    /// List all plugin IDs with saved configuration.
    fn list_plugin_configs(&self) -> Result<Vec<String>, ConfigError>;
}

/// File-backed storage rooted at a SignalK home directory.
#[derive(Debug, Clone)]
pub struct FileConfigStorage {
    root: PathBuf,
}

impl FileConfigStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at `$HOME/.signalk`, or `./.signalk` without a home.
    pub fn default_location() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".signalk"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plugin_dir(&self) -> PathBuf {
        self.root.join("plugin-config-data")
    }

    fn plugin_file(&self, plugin_id: &str) -> PathBuf {
        self.plugin_dir().join(format!("{plugin_id}.json"))
    }
}

impl ConfigStorage for FileConfigStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<Value, ConfigError> {
        let path = self.plugin_file(plugin_id);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::ReadError(format!("{}: {}", path.display(), e)),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| ConfigError::InvalidData(format!("{}: {}", path.display(), e)))
    }

    fn save_plugin_config(&self, plugin_id: &str, config: &Value) -> Result<(), ConfigError> {
        fs::create_dir_all(self.plugin_dir())
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        // Write to a sibling file and rename so readers never see a torn file
        let path = self.plugin_file(plugin_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    fn list_plugin_configs(&self) -> Result<Vec<String>, ConfigError> {
        let entries = match fs::read_dir(self.plugin_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConfigError::ReadError(e.to_string())),
        };

        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(String::from)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with one plugin configuration.
    pub fn with_plugin_config(plugin_id: &str, config: Value) -> Self {
        let storage = Self::new();
        if let Ok(mut data) = storage.data.write() {
            data.insert(plugin_id.to_string(), config);
        }
        storage
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<Value, ConfigError> {
        let data = self
            .data
            .read()
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        data.get(plugin_id)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(plugin_id.to_string()))
    }

    fn save_plugin_config(&self, plugin_id: &str, config: &Value) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|e| ConfigError::WriteError(e.to_string()))?
            .insert(plugin_id.to_string(), config.clone());
        Ok(())
    }

    fn list_plugin_configs(&self) -> Result<Vec<String>, ConfigError> {
        let data = self
            .data
            .read()
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        let mut ids: Vec<String> = data.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileConfigStorage::new(dir.path());

        let config = json!({"enabled": true, "configuration": {"url": "https://cloud.signalk.org"}});
        storage.save_plugin_config("signalk-cloud", &config).unwrap();

        assert_eq!(storage.load_plugin_config("signalk-cloud").unwrap(), config);
        assert_eq!(storage.list_plugin_configs().unwrap(), vec!["signalk-cloud"]);
        assert!(dir
            .path()
            .join("plugin-config-data/signalk-cloud.json")
            .exists());
    }

    #[test]
    fn test_file_storage_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileConfigStorage::new(dir.path());

        assert!(matches!(
            storage.load_plugin_config("nope"),
            Err(ConfigError::NotFound(_))
        ));
        assert!(storage.list_plugin_configs().unwrap().is_empty());
    }

    #[test]
    fn test_file_storage_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileConfigStorage::new(dir.path());
        fs::create_dir_all(dir.path().join("plugin-config-data")).unwrap();
        fs::write(dir.path().join("plugin-config-data/broken.json"), "{not json").unwrap();

        assert!(matches!(
            storage.load_plugin_config("broken"),
            Err(ConfigError::InvalidData(_))
        ));
    }

    #[test]
    fn test_memory_storage_overwrites() {
        let storage = MemoryConfigStorage::with_plugin_config("p", json!({"a": 1}));
        storage.save_plugin_config("p", &json!({"a": 2})).unwrap();
        assert_eq!(storage.load_plugin_config("p").unwrap()["a"], 2);
    }
}
