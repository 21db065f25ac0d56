//! Persistent key-value backend used by the route store and tour progress
//!
//! Backend failures degrade to cache-miss semantics: a read that fails is
//! `None`, a write that fails is logged and reported, and callers recompute
//! rather than crash.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Storage failure surfaced to callers that need to know a write was lost
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("backend write failed: {0}")]
    Write(String),
}

/// Generic key-value persistence. String keys, JSON-string values.
pub trait KeyValueBackend: Send + Sync {
    /// Read a value; any backend failure reads as absent
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&self, key: &str);
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// One file per key under a directory. Keys are sanitized so `route:{id}`
/// maps to a flat file name.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    // Keys contain ':' separators (`route:{id}`) which are awkward in file
    // names; encode them reversibly so listings can recover the key.
    fn encode(key: &str) -> String {
        key.replace(':', "__")
    }

    fn decode(name: &str) -> String {
        name.replace("__", ":")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::encode(key)))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key = %key, error = %e, "kv_read_failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        std::fs::write(self.path_for(key), value).map_err(|e| {
            warn!(key = %key, error = %e, "kv_write_failed");
            KvError::Write(e.to_string())
        })
    }

    fn remove(&self, key: &str) {
        if let Err(e) = std::fs::remove_file(self.path_for(key)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "kv_remove_failed");
            }
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| name.strip_suffix(".json").map(Self::decode))
            .filter(|key| key.starts_with(prefix))
            .collect()
    }
}

/// In-memory backend for tests
#[derive(Default)]
pub struct MemoryBackend {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map.lock().keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_round_trip() {
        let dir = TempDir::new().unwrap();
        let kv = FileBackend::new(dir.path()).unwrap();

        kv.set("route:abc-123", r#"{"x":1}"#).unwrap();
        assert_eq!(kv.get("route:abc-123"), Some(r#"{"x":1}"#.to_string()));

        kv.remove("route:abc-123");
        assert_eq!(kv.get("route:abc-123"), None);
    }

    #[test]
    fn test_file_backend_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let kv = FileBackend::new(dir.path()).unwrap();
        assert_eq!(kv.get("nope"), None);
    }

    #[test]
    fn test_file_backend_prefix_listing() {
        let dir = TempDir::new().unwrap();
        let kv = FileBackend::new(dir.path()).unwrap();

        kv.set("route:a", "1").unwrap();
        kv.set("route:b", "2").unwrap();
        kv.set("route-index", "3").unwrap();

        let mut keys = kv.keys_with_prefix("route:");
        keys.sort();
        assert_eq!(keys, vec!["route:a", "route:b"]);
    }

    #[test]
    fn test_memory_backend() {
        let kv = MemoryBackend::new();
        kv.set("k1", "v1").unwrap();
        kv.set("k2", "v2").unwrap();
        assert_eq!(kv.get("k1"), Some("v1".to_string()));
        assert_eq!(kv.keys_with_prefix("k").len(), 2);
        kv.remove("k1");
        assert_eq!(kv.get("k1"), None);
    }
}
