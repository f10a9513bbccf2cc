//! Cache of renumbered code segments shared by all shards of a run
//!
//! Many shards share the exact same set of code segments (most code lives in
//! master splits), so the renumbering result is memoized under a key derived
//! from the set of segment sources. The map is safe to use from parallel merge
//! tasks: a key is computed at most once, concurrent requests for a key that
//! is being computed wait for that result.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use log::trace;
use sha2::{Digest, Sha256};

use super::dex::DexSource;
use crate::model::entry::{ContentDigest, ModuleEntry};

/// Identity of a set of code-segment sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DexMergeKey(ContentDigest);

impl DexMergeKey {
    /// Key over the sorted `(module, path, content digest)` triples
    ///
    /// Input order does not matter; two shards contributing the same sources
    /// get the same key.
    pub(crate) fn from_sources(sources: &[DexSource]) -> Self {
        let mut triples: Vec<(&str, &str, ContentDigest)> = sources
            .iter()
            .map(|source| (source.module.as_str(), source.entry.path().as_str(), source.digest))
            .collect();
        triples.sort_unstable();
        triples.dedup();

        let mut hasher = Sha256::new();
        for (module, path, digest) in triples {
            hasher.update(module.as_bytes());
            hasher.update([0_u8]);
            hasher.update(path.as_bytes());
            hasher.update([0_u8]);
            hasher.update(digest.as_bytes());
        }
        let bytes: [u8; 32] = hasher.finalize().into();
        Self(ContentDigest::from(bytes))
    }
}

/// Hit and miss counters of a [`DexMergeCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Concurrent memo of code-segment merges, scoped to one generation run
#[derive(Debug, Default)]
pub struct DexMergeCache {
    merged: DashMap<DexMergeKey, Arc<[ModuleEntry]>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl DexMergeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `key`, computing and storing it with `merge` on a miss
    pub fn get_or_merge(
        &self,
        key: DexMergeKey,
        merge: impl FnOnce() -> Vec<ModuleEntry>,
    ) -> Arc<[ModuleEntry]> {
        if let Some(cached) = self.merged.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("Dex merge cache hit for {key:?}");
            return Arc::clone(cached.value());
        }

        // The entry guard keeps the key's shard locked until the value is stored
        match self.merged.entry(key) {
            Entry::Occupied(occupied) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Dex merge cache miss for {key:?}");
                let merged: Arc<[ModuleEntry]> = merge().into();
                vacant.insert(Arc::clone(&merged));
                merged
            }
        }
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.merged.len(),
        }
    }
}
