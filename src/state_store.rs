use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use crate::warn;

/// Key/value persistence capability used to remember the last-used URL and
/// per-monitor settings across a forced rebuild. The storage mechanism is
/// deliberately behind this trait; the core only needs put/get/clear.
pub trait StateStore: Send + Sync {
    fn put(&self, key: &str, value: &str);
    fn get(&self, key: &str) -> Option<String>;
    fn clear(&self);
}

pub const KEY_DEFAULT_URL: &str = "default_url";

pub fn transparency_key(device_name: &str) -> String {
    format!("monitor.{device_name}.transparent")
}

/// JSON-file backed store, write-through with an in-memory cache. I/O
/// failures are logged and treated as absent values, never fatal.
pub struct FileStateStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStateStore {
    pub fn open(path: PathBuf) -> Self {
        let cache = fs::read_to_string(&path)
            .ok()
            .and_then(|txt| serde_json::from_str::<HashMap<String, String>>(&txt).ok())
            .unwrap_or_default();

        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    fn flush(&self, cache: &HashMap<String, String>) {
        if let Some(dir) = self.path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        match serde_json::to_string_pretty(cache) {
            Ok(txt) => {
                if let Err(e) = fs::write(&self.path, txt) {
                    warn!("[STATE] Failed to write {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("[STATE] Failed to serialize state: {e}"),
        }
    }
}

impl StateStore for FileStateStore {
    fn put(&self, key: &str, value: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(key.to_string(), value.to_string());
        self.flush(&cache);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn clear(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.clear();
        self.flush(&cache);
    }
}

/// In-memory store for tests and for running without persistence.
#[derive(Default)]
pub struct MemoryStateStore {
    map: Mutex<HashMap<String, String>>,
}

impl StateStore for MemoryStateStore {
    fn put(&self, key: &str, value: &str) {
        self.map.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn clear(&self) {
        self.map.lock().unwrap().clear();
    }
}
