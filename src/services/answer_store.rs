use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::time::{format_offset, parse_server_instant};
use crate::models::{AnswerSelection, PersistedAnswer};

pub(crate) const ANSWERS_KEY: &str = "mcq_answers";
pub(crate) const ANCHOR_KEY: &str = "quiz_start_time";
pub(crate) const TOKEN_KEY: &str = "access_token";

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store io failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store key: {0}")]
    InvalidKey(String),
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable string key-value storage.
pub(crate) trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// One file per key under a state directory; writes go through a temp file and rename.
#[derive(Debug, Clone)]
pub(crate) struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub(crate) fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|source| StoreError::Io { key: root.display().to_string(), source })?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { key: key.to_string(), source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let io_err = |source| StoreError::Io { key: key.to_string(), source };

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { key: key.to_string(), source }),
        }
    }
}

/// Persistence of the in-progress answers and the session anchor.
#[derive(Clone)]
pub(crate) struct AnswerStore {
    kv: Arc<dyn KeyValueStore>,
}

impl AnswerStore {
    pub(crate) fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub(crate) fn save_answers(&self, answers: &AnswerSelection) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&answers.to_persisted())
            .map_err(|source| StoreError::Encode { key: ANSWERS_KEY, source })?;
        self.kv.set(ANSWERS_KEY, &encoded)?;
        tracing::debug!(answered = answers.answered_count(), "Answers persisted");
        Ok(())
    }

    /// Unreadable or corrupt data is logged and treated as absent.
    pub(crate) fn load_answers(&self) -> AnswerSelection {
        let raw = match self.kv.get(ANSWERS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return AnswerSelection::default(),
            Err(err) => {
                tracing::error!(error = %err, "Failed to read persisted answers");
                return AnswerSelection::default();
            }
        };

        match serde_json::from_str::<Vec<PersistedAnswer>>(&raw) {
            Ok(entries) => {
                let answers = AnswerSelection::from_persisted(entries);
                tracing::debug!(answered = answers.answered_count(), "Answers loaded from store");
                answers
            }
            Err(err) => {
                tracing::warn!(error = %err, "Discarding corrupt persisted answers");
                AnswerSelection::default()
            }
        }
    }

    pub(crate) fn save_anchor(&self, anchor: OffsetDateTime) -> Result<(), StoreError> {
        self.kv.set(ANCHOR_KEY, &format_offset(anchor))
    }

    pub(crate) fn load_anchor(&self) -> Option<OffsetDateTime> {
        match self.kv.get(ANCHOR_KEY) {
            Ok(Some(raw)) => parse_server_instant(&raw),
            Ok(None) => None,
            Err(err) => {
                tracing::error!(error = %err, "Failed to read persisted anchor");
                None
            }
        }
    }

    /// Removes answers and anchor. Only called once the server has confirmed
    /// a terminal outcome.
    pub(crate) fn purge(&self) -> Result<(), StoreError> {
        self.kv.remove(ANSWERS_KEY)?;
        self.kv.remove(ANCHOR_KEY)?;
        tracing::info!("Persisted quiz state purged");
        Ok(())
    }
}
