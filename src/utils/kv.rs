//! Key-value persistence.
//!
//! [KeyValueStore] is the raw substrate: string keys to string values, nothing more. [Persistence] wraps a substrate
//! with the storage conventions of this crate:
//!
//! * every value is written as a JSON envelope `{"value": ...}`,
//! * reads tolerate values that were JSON-encoded twice by older writers,
//! * seeding writes (`force = false`) never overwrite,
//! * failures are logged and degrade to "no value" instead of reaching the caller.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use anyhow::{Context, Result};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// The raw substrate the [Persistence] adapter writes through.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ephemeral in-process substrate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.items).remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.items).keys().cloned().collect())
    }
}

/// Substrate backed by a single JSON object file. The whole file is rewritten on every mutation, and a mutation is
/// visible to reads only once the file write succeeded.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; it is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file {}", path.display()))?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text)
                    .with_context(|| format!("store file {} is not a JSON object of strings", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, items: Mutex::new(items) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_out(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, text).with_context(|| format!("failed to write store file {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = lock(&self.items);
        let mut next = items.clone();
        next.insert(key.to_string(), value.to_string());
        self.write_out(&next)?;
        *items = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = lock(&self.items);
        if !items.contains_key(key) {
            return Ok(());
        }
        let mut next = items.clone();
        next.remove(key);
        self.write_out(&next)?;
        *items = next;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.items).keys().cloned().collect())
    }
}

/// Parse a stored string, unwrapping one extra level of JSON string encoding if present.
fn decode_layers(raw: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(raw)?;
    match parsed {
        Value::String(inner) if !inner.is_empty() => Ok(serde_json::from_str(&inner)?),
        other => Ok(other),
    }
}

/// The persistence adapter. Cheap to clone; clones share the same substrate.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Adapter over a fresh [MemoryStore].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Write `{"value": value}` under `key`. Without `force`, a key that already holds a value is left alone.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, force: bool) {
        if !force {
            match self.store.get_item(key) {
                Ok(Some(existing)) if !existing.is_empty() => return,
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading {} before seeding, write skipped: {:#}", key, e);
                    return;
                }
            }
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                error!("Error serializing {} for storage, write skipped: {}", key, e);
                return;
            }
        };
        let envelope = json!({ "value": value });
        if let Err(e) = self.store.set_item(key, &envelope.to_string()) {
            error!("Error saving {} to storage: {:#}", key, e);
        }
    }

    /// The string inside the `value` envelope at `key`, or `""` if missing or malformed.
    /// Non-string values are returned as compact JSON text.
    pub fn get(&self, key: &str) -> String {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return String::new(),
            Err(e) => {
                error!("Error reading {} from storage: {:#}", key, e);
                return String::new();
            }
        };
        match decode_layers(&raw) {
            Ok(decoded) => match decoded.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            Err(e) => {
                error!("Error parsing storage item {}: {}", key, e);
                String::new()
            }
        }
    }

    /// Decode a structured record stored either as `{"value": T}` or as a bare `T`, each possibly encoded twice.
    pub fn get_document<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!("Error reading {} from storage: {:#}", key, e);
                return None;
            }
        };
        Self::decode_document(key, &raw)
    }

    pub(crate) fn decode_document<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
        let decoded = match decode_layers(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Storage item {} is not valid JSON: {}", key, e);
                return None;
            }
        };
        let candidate = match decoded {
            Value::Object(mut map) if map.len() == 1 && map.contains_key("value") => {
                match map.remove("value") {
                    Some(Value::String(inner)) => serde_json::from_str(&inner).unwrap_or(Value::String(inner)),
                    Some(inner) => inner,
                    None => Value::Null,
                }
            }
            other => other,
        };
        match serde_json::from_value(candidate) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!("Storage item {} does not decode: {}", key, e);
                None
            }
        }
    }

    /// Raw stored strings of every key starting with `prefix`, or only the key equal to `prefix` when `exact`.
    /// An empty prefix matches nothing.
    pub fn find_by_prefix(&self, prefix: &str, exact: bool) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        if prefix.is_empty() {
            return found;
        }
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!("Error listing storage keys: {:#}", e);
                return found;
            }
        };
        for key in keys {
            let matched = if exact { key == prefix } else { key.starts_with(prefix) };
            if !matched {
                continue;
            }
            match self.store.get_item(&key) {
                Ok(value) => {
                    found.insert(key, value.unwrap_or_default());
                }
                Err(e) => error!("Error reading {} from storage: {:#}", key, e),
            }
        }
        found
    }

    /// Remove every key. Absent keys are not an error.
    pub fn delete<'a>(&self, keys: impl IntoIterator<Item=&'a String>) {
        for key in keys {
            if let Err(e) = self.store.remove_item(key) {
                error!("Error removing {} from storage: {:#}", key, e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_kv {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use anyhow::{anyhow, Result};
    use serde::Deserialize;
    use super::{FileStore, KeyValueStore, MemoryStore, Persistence};

    /// Memory store that records every write.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub inner: MemoryStore,
        pub writes: Mutex<Vec<(String, String)>>,
        pub write_count: AtomicUsize,
    }

    impl RecordingStore {
        pub fn writes_to(&self, key: &str) -> Vec<String> {
            self.writes.lock().unwrap().iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
        }
    }

    impl KeyValueStore for RecordingStore {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            self.write_count.fetch_add(1, Ordering::SeqCst);
            self.writes.lock().unwrap().push((key.to_string(), value.to_string()));
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get_item(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("quota exceeded"))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }

        fn remove_item(&self, _key: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }

        fn keys(&self) -> Result<Vec<String>> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn memory() -> (Arc<MemoryStore>, Persistence) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Persistence::new(store))
    }

    #[test]
    fn test_envelope_round_trip() {
        let (store, persistence) = memory();
        persistence.set("k", "hello", true);
        assert_eq!(store.get_item("k").unwrap().unwrap(), r#"{"value":"hello"}"#);
        assert_eq!(persistence.get("k"), "hello");
        assert_eq!(persistence.get("missing"), "");
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let (_, persistence) = memory();
        persistence.set("groq_api", "", false);
        assert_eq!(persistence.get("groq_api"), "");
        persistence.set("groq_api", "key-1", true);
        persistence.set("groq_api", "", false);
        assert_eq!(persistence.get("groq_api"), "key-1");
    }

    #[test]
    fn test_tolerates_double_encoding() {
        let (store, persistence) = memory();
        let doubly = serde_json::to_string(r#"{"value": "legacy"}"#).unwrap();
        store.set_item("old", &doubly).unwrap();
        assert_eq!(persistence.get("old"), "legacy");

        store.set_item("empty", r#""""#).unwrap();
        assert_eq!(persistence.get("empty"), "");
        store.set_item("garbage", "{not json").unwrap();
        assert_eq!(persistence.get("garbage"), "");
        store.set_item("number", r#"{"value": 42}"#).unwrap();
        assert_eq!(persistence.get("number"), "42");
    }

    #[test]
    fn test_get_document_shapes() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Doc {
            a: u8,
        }
        let (store, persistence) = memory();
        persistence.set("enveloped", &serde_json::json!({"a": 1}), true);
        store.set_item("bare", r#"{"a": 2}"#).unwrap();
        store.set_item("double", &serde_json::to_string(r#"{"a": 3}"#).unwrap()).unwrap();
        store.set_item("bad", r#"{"b": 3}"#).unwrap();
        assert_eq!(persistence.get_document::<Doc>("enveloped"), Some(Doc { a: 1 }));
        assert_eq!(persistence.get_document::<Doc>("bare"), Some(Doc { a: 2 }));
        assert_eq!(persistence.get_document::<Doc>("double"), Some(Doc { a: 3 }));
        assert_eq!(persistence.get_document::<Doc>("bad"), None);
        assert_eq!(persistence.get_document::<Doc>("missing"), None);
    }

    #[test]
    fn test_find_by_prefix() {
        let (_, persistence) = memory();
        for key in ["template_a", "template_ab", "__a__x", "other"] {
            persistence.set(key, "v", true);
        }
        let found = persistence.find_by_prefix("template_a", false);
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["template_a", "template_ab"]);
        let found = persistence.find_by_prefix("template_a", true);
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["template_a"]);
        assert!(persistence.find_by_prefix("", false).is_empty());
        assert!(persistence.find_by_prefix("", true).is_empty());
    }

    #[test]
    fn test_delete_ignores_absent() {
        let (store, persistence) = memory();
        persistence.set("a", "1", true);
        persistence.delete(&["a".to_string(), "never".to_string()]);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_failures_degrade() {
        let persistence = Persistence::new(Arc::new(BrokenStore));
        persistence.set("k", "v", true);
        persistence.set("k", "v", false);
        assert_eq!(persistence.get("k"), "");
        assert!(persistence.find_by_prefix("k", false).is_empty());
        persistence.delete(&["k".to_string()]);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        {
            let persistence = Persistence::new(Arc::new(FileStore::open(&path).unwrap()));
            persistence.set("__t__p", "kept", true);
            persistence.set("gone", "x", true);
            persistence.delete(&["gone".to_string()]);
        }
        let reopened = Persistence::new(Arc::new(FileStore::open(&path).unwrap()));
        assert_eq!(reopened.get("__t__p"), "kept");
        assert_eq!(reopened.get("gone"), "");
    }

    #[test]
    fn test_file_store_failed_write_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = FileStore::open(blocker.join("store.json")).unwrap();
        assert!(store.set_item("k", r#"{"value":"v"}"#).is_err());
        assert_eq!(store.get_item("k").unwrap(), None);
        assert!(store.keys().unwrap().is_empty());

        let path = dir.path().join("store.json");
        let persistence = Persistence::new(Arc::new(FileStore::open(&path).unwrap()));
        persistence.set("kept", "v1", true);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        persistence.set("kept", "v2", true);
        persistence.set("new", "x", true);
        persistence.delete(&["kept".to_string()]);
        assert_eq!(persistence.get("kept"), "v1");
        assert_eq!(persistence.get("new"), "");
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(FileStore::open(&path).is_err());
    }
}
