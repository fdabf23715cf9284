//! Parse-result cache
//!
//! Bounded LRU keyed by absolute file path. An entry is valid only while
//! the file's modification time is unchanged; stale entries count as
//! misses and are overwritten by the next insert. A SHA-256 content hash
//! is recorded alongside each entry so the key can be promoted to
//! content-identity on filesystems with coarse mtime resolution.

use crate::service_spec::{ParseError, ServiceSpec};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Default cache capacity (entries)
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry {
    modified: SystemTime,
    #[allow(dead_code)]
    content_hash: String,
    specs: Vec<ServiceSpec>,
    errors: Vec<ParseError>,
}

/// Hit/miss counters, readable while the parser runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe LRU over per-file parse results
///
/// The LRU recency update makes every lookup a write, so a single mutex
/// guards the map and the stats together.
pub struct ParseCache {
    inner: Mutex<CacheState>,
}

struct CacheState {
    entries: LruCache<PathBuf, CacheEntry>,
    stats: CacheStats,
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a file's prior parse, valid only for an unchanged mtime
    pub fn get(
        &self,
        path: &Path,
        modified: SystemTime,
    ) -> Option<(Vec<ServiceSpec>, Vec<ParseError>)> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let hit = match state.entries.get(path) {
            Some(entry) if entry.modified == modified => {
                Some((entry.specs.clone(), entry.errors.clone()))
            }
            _ => None,
        };
        match &hit {
            Some(_) => state.stats.hits += 1,
            None => state.stats.misses += 1,
        }
        hit
    }

    /// Record a file's parse outcome, evicting the least recent on overflow
    pub fn insert(
        &self,
        path: PathBuf,
        modified: SystemTime,
        contents: &str,
        specs: Vec<ServiceSpec>,
        errors: Vec<ParseError>,
    ) {
        let entry = CacheEntry {
            modified,
            content_hash: content_hash(contents),
            specs,
            errors,
        };
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.put(path, entry);
    }

    pub fn len(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.stats
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// SHA-256 of the file contents, hex encoded
pub fn content_hash(contents: &str) -> String {
    let digest = Sha256::digest(contents.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
