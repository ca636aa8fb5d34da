//! Local cache layer.
//!
//! A device-local, string-keyed store holding the slip as a JSON array of
//! `{ prediction, addedAt }` entries. Reads and writes are synchronous and
//! best-effort; callers log failures and carry on.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{CachedSlipEntry, PickslipError};

/// Default cache key for the slip entry.
pub const DEFAULT_CACHE_KEY: &str = "bet_slip";

/// Synchronous string-keyed slip cache.
pub trait LocalCache: Send + Sync {
    /// Read the cached slip. `None` when nothing has been cached yet.
    fn read(&self) -> Result<Option<Vec<CachedSlipEntry>>>;

    /// Overwrite the cached slip.
    fn write(&self, entries: &[CachedSlipEntry]) -> Result<()>;

    /// Drop the cached entry entirely.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// JSON file cache
// ---------------------------------------------------------------------------

/// File-backed cache: one JSON object mapping keys to serialized values, so
/// several keyed entries can share a file.
pub struct JsonFileCache {
    path: PathBuf,
    key: String,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache from {}", self.path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse cache file {}", self.path.display()))
    }

    fn save_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(map).context("Failed to serialise cache")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache to {}", self.path.display()))
    }
}

impl LocalCache for JsonFileCache {
    fn read(&self) -> Result<Option<Vec<CachedSlipEntry>>> {
        let map = self.load_map()?;
        let Some(raw) = map.get(&self.key) else {
            debug!(path = %self.path.display(), key = %self.key, "No cached slip");
            return Ok(None);
        };
        let entries: Vec<CachedSlipEntry> = serde_json::from_str(raw)
            .map_err(|e| PickslipError::Cache(format!("corrupt entry '{}': {e}", self.key)))?;
        info!(path = %self.path.display(), items = entries.len(), "Slip loaded from local cache");
        Ok(Some(entries))
    }

    fn write(&self, entries: &[CachedSlipEntry]) -> Result<()> {
        // An unparseable file is replaced; the other keys in it are lost
        let mut map = match self.load_map() {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cache file unreadable, resetting it");
                BTreeMap::new()
            }
        };
        map.insert(
            self.key.clone(),
            serde_json::to_string(entries).context("Failed to serialise slip entries")?,
        );
        self.save_map(&map)?;
        debug!(path = %self.path.display(), items = entries.len(), "Slip cached");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.load_map()?;
        if map.remove(&self.key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

/// Process-local cache, for tests and ephemeral sessions.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    key: String,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            key: DEFAULT_CACHE_KEY.to_string(),
        }
    }

    /// Seed the cache with entries.
    pub fn with_entries(entries: &[CachedSlipEntry]) -> Result<Self> {
        let cache = Self::new();
        cache.write(entries)?;
        Ok(cache)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| PickslipError::Cache("memory cache lock poisoned".to_string()).into())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache for MemoryCache {
    fn read(&self) -> Result<Option<Vec<CachedSlipEntry>>> {
        let map = self.lock()?;
        match map.get(&self.key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, entries: &[CachedSlipEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.lock()?.insert(self.key.clone(), raw);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.remove(&self.key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
