//! Incremental indexing ledger.
//!
//! The ledger maps each indexed file to the fingerprint it had when indexed
//! and the chunk ids it owns in the vector store. It is the only record of
//! what has been indexed, so every store mutation is mirrored here.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_revision: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    /// blake3 hex digest of the file bytes.
    pub fingerprint: String,
    #[serde(default)]
    pub chunk_ids: Vec<String>,
    /// Modification time in ms since the epoch, used to skip hashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

impl IndexState {
    #[must_use]
    pub fn fingerprint(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|f| f.fingerprint.as_str())
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Replace the entry for `path` wholesale.
    pub fn set_file_state(
        &mut self,
        path: &str,
        fingerprint: String,
        chunk_ids: Vec<String>,
        modified: Option<u64>,
    ) {
        self.files.insert(
            path.to_owned(),
            FileState {
                fingerprint,
                chunk_ids,
                modified,
            },
        );
    }

    pub fn remove_file(&mut self, path: &str) -> Option<FileState> {
        self.files.remove(path)
    }

    /// Total chunk ids tracked across all files.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.files.values().map(|f| f.chunk_ids.len()).sum()
    }
}

/// Owner of the persisted [`IndexState`].
pub trait StateStore: Send + Sync {
    /// Load the ledger. A missing or unreadable ledger is an empty one.
    fn load(&self) -> IndexState;

    /// Persist the ledger. Implementations must never leave a partially
    /// written ledger behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be serialized or written.
    fn save(&self, state: &IndexState) -> Result<()>;
}

/// JSON ledger on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> IndexState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return IndexState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read index state, starting fresh");
                return IndexState::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt index state, starting fresh");
                IndexState::default()
            }
        }
    }

    fn save(&self, state: &IndexState) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&json)?;
            // The rename must not become visible before the bytes do.
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            IndexError::Io(e)
        })
    }
}

/// In-memory ledger for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<IndexState>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new(state: IndexState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: Mutex::new(0),
        }
    }

    /// Snapshot of the last saved ledger.
    #[must_use]
    pub fn snapshot(&self) -> IndexState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or_default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> IndexState {
        self.snapshot()
    }

    fn save(&self, state: &IndexState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| IndexError::Other(e.to_string()))?;
        *guard = state.clone();
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}

/// Project-relative key for `path`, always `/`-separated.
#[must_use]
pub fn normalize_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexState {
        let mut state = IndexState {
            last_revision: Some("abc123".into()),
            ..IndexState::default()
        };
        state.set_file_state(
            "src/a.ts",
            "f1".into(),
            vec!["id1".into(), "id2".into()],
            Some(42),
        );
        state
    }

    #[test]
    fn helpers_query_and_mutate() {
        let mut state = sample();
        assert_eq!(state.fingerprint("src/a.ts"), Some("f1"));
        assert_eq!(state.chunk_count(), 2);
        assert!(state.fingerprint("missing").is_none());

        state.set_file_state("src/a.ts", "f2".into(), vec!["id3".into()], None);
        assert_eq!(state.file("src/a.ts").unwrap().chunk_ids, vec!["id3"]);

        let removed = state.remove_file("src/a.ts").unwrap();
        assert_eq!(removed.fingerprint, "f2");
        assert!(state.files.is_empty());
    }

    #[test]
    fn json_layout_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["lastRevision"], "abc123");
        assert_eq!(json["files"]["src/a.ts"]["chunkIds"][1], "id2");
        assert_eq!(json["files"]["src/a.ts"]["fingerprint"], "f1");
    }

    #[test]
    fn absent_revision_is_omitted_and_accepted() {
        let state: IndexState =
            serde_json::from_str(r#"{"files":{"a.md":{"fingerprint":"x","chunkIds":[]}}}"#).unwrap();
        assert!(state.last_revision.is_none());
        assert!(state.file("a.md").unwrap().modified.is_none());
        let out = serde_json::to_string(&IndexState::default()).unwrap();
        assert!(!out.contains("lastRevision"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load(), IndexState::default());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(JsonStateStore::new(&path).load(), IndexState::default());
    }

    #[test]
    fn save_then_load_round_trips_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sintesi").join("index-state.json");
        let store = JsonStateStore::new(&path);
        store.save(&sample()).unwrap();

        assert_eq!(store.load(), sample());
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("index-state.json")]);
    }

    #[test]
    fn save_replaces_a_larger_ledger_completely() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index-state.json");
        let store = JsonStateStore::new(&path);
        store.save(&sample()).unwrap();
        store.save(&IndexState::default()).unwrap();

        assert_eq!(store.load(), IndexState::default());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<IndexState>(&raw).is_ok());
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStateStore::default();
        assert_eq!(store.load(), IndexState::default());
        store.save(&sample()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn normalize_path_is_relative_and_forward_slashed() {
        let root = Path::new("/work/project");
        let file = root.join("src").join("auth").join("login.ts");
        assert_eq!(normalize_path(root, &file), "src/auth/login.ts");
        assert_eq!(normalize_path(root, Path::new("./docs/a.md")), "docs/a.md");
    }
}
