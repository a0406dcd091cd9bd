//! Persistent key/value storage.
//!
//! Values are JSON files in a directory, one file per key. The default
//! directory is the platform config dir:
//!   - Linux: `~/.config/roomchat/`
//!   - macOS: `~/Library/Application Support/roomchat/`
//!   - Windows: `%APPDATA%\roomchat\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage under the platform config directory.
    pub fn default_location() -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(Self::new(config_dir.join("roomchat")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a value under `key`, replacing any previous value.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.file_path(key), json)?;
        Ok(())
    }

    /// Load a value.
    ///
    /// Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).is_file()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path().join("nested"));

        assert!(!storage.exists("token"));
        storage.save("token", &"abc").unwrap();
        assert!(storage.exists("token"));
        assert_eq!(storage.load::<String>("token").as_deref(), Some("abc"));

        storage.remove("token");
        assert!(!storage.exists("token"));
        assert_eq!(storage.load::<String>("token"), None);
    }

    #[test]
    fn keys_are_sanitized() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path());
        storage.save("a/b:c", &1u32).unwrap();
        assert!(tmp.path().join("a_b_c.json").is_file());
        assert_eq!(storage.load::<u32>("a/b:c"), Some(1));
    }

    #[test]
    fn undecodable_value_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path());
        std::fs::write(tmp.path().join("user.json"), "not json").unwrap();
        assert_eq!(storage.load::<u32>("user"), None);
    }
}
