use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use virtualgrid::{ColumnPreferences, PreferenceError, PreferenceStore};

/// Keeps preferences in memory, keyed like a persistent store. Useful for tests and for hosts
/// that persist preferences themselves via the save callback.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<String, ColumnPreferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ColumnPreferences> {
        self.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, ColumnPreferences>>, PreferenceError>
    {
        self.entries
            .lock()
            .map_err(|_| PreferenceError::Backend("memory store lock poisoned".into()))
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> Result<Option<ColumnPreferences>, PreferenceError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&self, key: &str, preferences: &ColumnPreferences) -> Result<(), PreferenceError> {
        self.lock()?.insert(key.to_owned(), preferences.clone());
        Ok(())
    }
}

/// Stores each preference key as a pretty-printed JSON file in one directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a crash mid-write
/// leaves the previous preferences intact.
#[derive(Clone, Debug)]
pub struct JsonFilePreferenceStore {
    dir: PathBuf,
}

impl JsonFilePreferenceStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file backing `key`. Characters outside `[A-Za-z0-9_-]` are replaced with `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self, key: &str) -> Result<Option<ColumnPreferences>, PreferenceError> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let prefs = serde_json::from_str(&text)
            .map_err(|e| PreferenceError::Serialization(format!("{}: {e}", path.display())))?;
        atrace!(path = %path.display(), "loaded column preferences");
        Ok(Some(prefs))
    }

    fn save(&self, key: &str, preferences: &ColumnPreferences) -> Result<(), PreferenceError> {
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(preferences)
            .map_err(|e| PreferenceError::Serialization(e.to_string()))?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        atrace!(path = %path.display(), "saved column preferences");
        Ok(())
    }
}
