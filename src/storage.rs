// storage.rs
// Durable storage for conversation state

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::conversation::StoreSnapshot;

const SESSIONS_FILENAME: &str = "sessions.json";

/// Backend that receives the full session map and current-session id.
pub trait SessionPersistence: Send {
    fn load(&self) -> Result<Option<StoreSnapshot>>;
    fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;
}

/// Stores every session in one JSON document under the data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory at {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_FILENAME)
    }
}

impl SessionPersistence for JsonFileStore {
    fn load(&self) -> Result<Option<StoreSnapshot>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read sessions file: {}", path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse sessions file: {}", path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let path = self.path();
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize sessions")?;

        // Write next to the target and rename, so a crash mid-write never leaves a torn file.
        let mut tmp = NamedTempFile::new_in(&self.data_dir)
            .with_context(|| format!("Failed to create temp file in {}", self.data_dir.display()))?;
        tmp.write_all(&json)
            .with_context(|| format!("Failed to write sessions to {}", tmp.path().display()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace sessions file: {}", path.display()))?;
        Ok(())
    }
}

/// In-memory backend shared between clones; records every save.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    saved: std::sync::Arc<parking_lot::Mutex<Vec<StoreSnapshot>>>,
}

#[cfg(test)]
impl MemoryPersistence {
    pub fn save_count(&self) -> usize {
        self.saved.lock().len()
    }

    pub fn last(&self) -> Option<StoreSnapshot> {
        self.saved.lock().last().cloned()
    }
}

#[cfg(test)]
impl SessionPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<StoreSnapshot>> {
        Ok(self.last())
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        self.saved.lock().push(snapshot.clone());
        Ok(())
    }
}
