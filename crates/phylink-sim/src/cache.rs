//! Simulation Result Cache
//!
//! Results are keyed by the SHA-256 of the configuration's JSON encoding,
//! optionally combined with a hash of the input bits. Entries live in memory
//! and, when a directory is given, as `<key>.json` files written through a
//! temporary file and a rename.
//!
//! A missing, unreadable or corrupt file is a cache miss: the problem is
//! logged at warn level and the caller recomputes.
//!
//! ## Usage
//!
//! ```rust
//! use phylink_core::config::SimulationConfig;
//! use phylink_sim::cache::{CacheKey, ResultCache};
//! use phylink_sim::pipeline::SimulationPipeline;
//!
//! let cache = ResultCache::in_memory();
//! let config = SimulationConfig { block_length: 64, seed: Some(1), ..Default::default() };
//! let bits = vec![1u8, 0, 1, 1, 0, 0, 1, 0];
//! let key = CacheKey::new(&config, Some(&bits)).unwrap();
//!
//! let first = cache.get_or_compute(&key, || SimulationPipeline::new(config.clone())?.simulate(&bits)).unwrap();
//! let second = cache.get_or_compute(&key, || unreachable!()).unwrap();
//! assert_eq!(first.reconstructed, second.reconstructed);
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::pipeline::SimulationResult;
use phylink_core::{PhyError, PhyResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const ENTRY_EXTENSION: &str = "json";

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of a bit block, in hex
pub fn data_hash(bits: &[u8]) -> String {
    to_hex(&Sha256::digest(bits))
}

/// Deterministic cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a configuration and, optionally, the input it was run on.
    pub fn new<C: Serialize>(config: &C, data: Option<&[u8]>) -> PhyResult<Self> {
        let encoded = serde_json::to_vec(config).map_err(|e| PhyError::Io(format!("cannot encode cache key: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        if let Some(bits) = data {
            hasher.update(b"|");
            hasher.update(data_hash(bits).as_bytes());
        }
        Ok(Self(to_hex(&hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory result cache with optional on-disk persistence.
#[derive(Debug)]
pub struct ResultCache {
    dir: Option<PathBuf>,
    memory: Mutex<HashMap<CacheKey, SimulationResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            memory: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache persisted under `dir`, created if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> PhyResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            ..Self::in_memory()
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn entry_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, SimulationResult>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up an entry. Counts a hit or a miss.
    pub fn get(&self, key: &CacheKey) -> Option<SimulationResult> {
        let found = self.lookup(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn lookup(&self, key: &CacheKey) -> Option<SimulationResult> {
        if let Some(result) = self.lock().get(key) {
            return Some(result.clone());
        }

        let path = self.entry_path(key)?;
        if !path.exists() {
            return None;
        }
        let loaded = std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice::<SimulationResult>(&bytes).map_err(|e| e.to_string()));
        match loaded {
            Ok(result) => {
                self.lock().insert(key.clone(), result.clone());
                Some(result)
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store an entry, replacing any previous one for the key.
    pub fn insert(&self, key: &CacheKey, result: &SimulationResult) -> PhyResult<()> {
        if let Some(path) = self.entry_path(key) {
            let bytes = serde_json::to_vec(result).map_err(|e| PhyError::Io(e.to_string()))?;
            let tmp = path.with_extension(format!("{}.tmp.{}", ENTRY_EXTENSION, std::process::id()));
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, &path)?;
        }
        self.lock().insert(key.clone(), result.clone());
        Ok(())
    }

    /// Cached result for `key`, or `compute()` stored under it.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> PhyResult<SimulationResult>
    where
        F: FnOnce() -> PhyResult<SimulationResult>,
    {
        if let Some(hit) = self.get(key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        let result = compute()?;
        self.insert(key, &result)?;
        Ok(result)
    }

    /// Remove every entry from memory and disk.
    pub fn clear(&self) -> PhyResult<()> {
        self.lock().clear();
        for path in self.disk_entries()? {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Number of distinct entries in memory or on disk.
    pub fn len(&self) -> usize {
        let mut keys: BTreeSet<String> = self.lock().keys().map(|k| k.0.clone()).collect();
        if let Ok(paths) = self.disk_entries() {
            keys.extend(
                paths
                    .iter()
                    .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string)),
            );
        }
        keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn disk_entries(&self) -> PhyResult<Vec<PathBuf>> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}
