//! Content-addressed cache of successful task results

use crate::error::CacheError;
use crate::plan::TaskSpec;
use crate::runner::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const CACHE_FORMAT_VERSION: u32 = 1;

/// SHA-256 (hex) of a task's canonical JSON form.
///
/// `TaskSpec` serializes with a fixed field order and sorted params, so equal
/// type, name, description and params always hash the same regardless of where
/// the task sits in the plan.
pub fn fingerprint(task: &TaskSpec) -> String {
    let canonical = serde_json::to_string(task).unwrap_or_else(|_| format!("{:?}", task));
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// On-disk form of one cached result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: ExecutionResult,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Monotonic access order; smallest is least recently used
    #[serde(default)]
    access_seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// In-memory entry. Recency lives in atomics so lookups only need the read lock.
#[derive(Debug)]
struct Slot {
    result: ExecutionResult,
    created_at: DateTime<Utc>,
    access_count: AtomicU64,
    last_accessed_ms: AtomicI64,
    access_seq: AtomicU64,
}

impl Slot {
    fn new(result: ExecutionResult, created_at: DateTime<Utc>, access_count: u64, seq: u64) -> Self {
        Self {
            result,
            created_at,
            access_count: AtomicU64::new(access_count),
            last_accessed_ms: AtomicI64::new(created_at.timestamp_millis()),
            access_seq: AtomicU64::new(seq),
        }
    }

    fn seq(&self) -> u64 {
        self.access_seq.load(Ordering::Relaxed)
    }

    fn touch(&self, seq: u64) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.access_seq.fetch_max(seq, Ordering::Relaxed);
    }

    fn to_entry(&self, fingerprint: &str) -> CacheEntry {
        let last_accessed = DateTime::from_timestamp_millis(
            self.last_accessed_ms.load(Ordering::Relaxed),
        )
        .unwrap_or(self.created_at);

        CacheEntry {
            fingerprint: fingerprint.to_string(),
            execution_time_ms: self.result.execution_time_ms,
            result: self.result.clone(),
            created_at: self.created_at,
            access_count: self.access_count.load(Ordering::Relaxed),
            last_accessed,
            access_seq: self.seq(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

pub struct TaskCache {
    entries: RwLock<HashMap<String, Slot>>,
    max_entries: usize,
    path: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    clock: AtomicU64,
}

impl TaskCache {
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            path: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clock: AtomicU64::new(0),
        }
    }

    /// Open a cache backed by `path`. An unreadable or corrupt file is logged
    /// and the cache starts empty.
    pub fn load(path: &Path, max_entries: usize) -> Self {
        let mut cache = Self::in_memory(max_entries);
        cache.path = Some(path.to_path_buf());

        if !path.exists() {
            debug!("No cache file at {}", path.display());
            return cache;
        }

        match read_cache_file(path) {
            Ok(file) => {
                let mut entries = file.entries;
                // Oldest access first so the bound keeps the most recent ones
                entries.sort_by_key(|e| (e.access_seq, e.last_accessed));
                let skip = entries.len().saturating_sub(cache.max_entries);

                let map = cache.entries.get_mut();
                for (seq, entry) in entries.into_iter().skip(skip).enumerate() {
                    let slot = Slot::new(entry.result, entry.created_at, entry.access_count, seq as u64);
                    slot.last_accessed_ms
                        .store(entry.last_accessed.timestamp_millis(), Ordering::Relaxed);
                    map.insert(entry.fingerprint, slot);
                }
                *cache.clock.get_mut() = map.len() as u64;
                info!("Loaded {} cached results from {}", map.len(), path.display());
            }
            Err(e) => warn!("Ignoring cache file: {}", e),
        }

        cache
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Stored result for `task`, refreshing its recency
    pub async fn get(&self, task: &TaskSpec) -> Option<ExecutionResult> {
        let key = fingerprint(task);
        let entries = self.entries.read().await;

        match entries.get(&key) {
            Some(slot) => {
                slot.touch(self.tick());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(slot.result.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `result` for `task`, evicting the least recently used entry when full
    pub async fn put(&self, task: &TaskSpec, result: ExecutionResult) {
        let key = fingerprint(task);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, slot)| slot.seq())
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                debug!("Evicted cache entry {}", &oldest[..12.min(oldest.len())]);
            }
        }

        entries.insert(key, Slot::new(result, Utc::now(), 0, self.tick()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries: self.len().await,
            max_entries: self.max_entries,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Atomically write the cache to its backing file. No-op for in-memory caches.
    pub async fn save(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut entries: Vec<CacheEntry> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(key, slot)| slot.to_entry(key))
            .collect();
        entries.sort_by_key(|e| e.access_seq);
        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.persist(path)?;

        debug!("Saved {} cache entries to {}", file.entries.len(), path.display());
        Ok(())
    }
}

fn read_cache_file(path: &Path) -> Result<CacheFile, CacheError> {
    let content = std::fs::read_to_string(path).map_err(|source| CacheError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

impl std::fmt::Debug for TaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCache")
            .field("max_entries", &self.max_entries)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
