//! Process-wide pattern database cache and scratch prototype.
//!
//! [`MpmService`] owns the two shared resources behind the MPM front-end:
//! the content-addressed cache of compiled databases and the scratch
//! prototype that thread scratch is cloned from. The two live behind
//! independent locks so frequent per-thread scratch cloning never
//! serializes against rare database compilation.
//!
//! Lock discipline:
//! - the cache mutex is held across the entire compile-or-reuse decision,
//!   guaranteeing at most one compilation per distinct pattern set
//!   process-wide;
//! - the prototype mutex is only taken for prototype creation/growth
//!   (inside the cache critical section) and for cloning (alone);
//! - the prototype mutex is never taken before the cache mutex.
//!
//! A process-wide default service hangs off a `OnceLock`; embedders that
//! want isolated caches construct their own service and share it via `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, warn};

use crate::compile::{self, CompiledDatabase};
use crate::config::MpmConfig;
use crate::engine::Scratch;
use crate::error::{MpmError, Result};
use crate::pattern::Pattern;

/// Cache performance counters, for monitoring and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total compile-or-reuse decisions taken.
    pub lookups: usize,
    /// Decisions resolved by reusing a cached database.
    pub hits: usize,
    /// Decisions that found no cached database.
    pub misses: usize,
    /// Databases actually compiled.
    pub compilations: usize,
    /// Entries evicted after their last context detached.
    pub evictions: usize,
}

/// A cached compiled database plus its reference count. The count tracks
/// contexts attached to the entry and is only mutated under the cache lock.
#[derive(Debug)]
struct CacheEntry {
    db: Arc<CompiledDatabase>,
    ref_cnt: u32,
}

#[derive(Debug)]
struct CacheTable {
    /// Fingerprint to entry chain. Chains carry 64-bit collisions; entries
    /// within a chain are told apart by full structural comparison.
    entries: HashMap<u64, Vec<CacheEntry>>,
    stats: CacheStats,
}

/// Shared service holding the database cache and the scratch prototype.
#[derive(Debug)]
pub struct MpmService {
    table: Mutex<CacheTable>,
    scratch_proto: Mutex<Option<Scratch>>,
    config: MpmConfig,
}

impl Default for MpmService {
    fn default() -> Self {
        Self::new()
    }
}

impl MpmService {
    pub fn new() -> Self {
        Self::with_config(MpmConfig::default())
    }

    pub fn with_config(config: MpmConfig) -> Self {
        Self {
            table: Mutex::new(CacheTable {
                entries: HashMap::with_capacity(config.cache_capacity),
                stats: CacheStats::default(),
            }),
            scratch_proto: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &MpmConfig {
        &self.config
    }

    /// The compile-or-reuse critical section.
    ///
    /// `patterns` must already be in canonical order with `fp` computed
    /// over it. On a hit the just-built pattern array is discarded and the
    /// shared database returned with its refcount bumped; on a miss the
    /// array is compiled, cached with a refcount of one, and the scratch
    /// prototype is created or grown to cover the new database.
    pub(crate) fn fetch_or_compile(
        &self,
        fp: u64,
        patterns: Vec<Pattern>,
    ) -> Result<Arc<CompiledDatabase>> {
        let mut guard = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let table = &mut *guard;
        table.stats.lookups += 1;

        if let Some(chain) = table.entries.get_mut(&fp) {
            if let Some(entry) = chain
                .iter_mut()
                .find(|entry| entry.db.patterns() == patterns.as_slice())
            {
                entry.ref_cnt += 1;
                table.stats.hits += 1;
                debug!(
                    fingerprint = fp,
                    patterns = entry.db.pattern_count(),
                    ref_cnt = entry.ref_cnt,
                    "reusing cached pattern database"
                );
                return Ok(Arc::clone(&entry.db));
            }
        }
        table.stats.misses += 1;

        let db = Arc::new(
            compile::compile_database(patterns).map_err(|e| MpmError::Compile(e.to_string()))?,
        );
        table.stats.compilations += 1;
        debug!(
            fingerprint = fp,
            patterns = db.pattern_count(),
            size_bytes = db.size(),
            "compiled new pattern database"
        );

        // First successful compile creates the prototype; later, larger
        // databases grow it. Nested inside the cache critical section so
        // prototype sizing races only with clones, never with compiles.
        {
            let mut proto = self.scratch_proto.lock().unwrap_or_else(|e| e.into_inner());
            match proto.as_mut() {
                Some(s) => s.grow_for(db.engine_db()),
                None => *proto = Some(Scratch::alloc(db.engine_db())),
            }
        }

        table.entries.entry(fp).or_default().push(CacheEntry {
            db: Arc::clone(&db),
            ref_cnt: 1,
        });
        Ok(db)
    }

    /// Detach one context from a cached database. When the last context
    /// detaches, the entry is evicted from the cache.
    pub(crate) fn release(&self, fp: u64, db: &Arc<CompiledDatabase>) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let Some(chain) = table.entries.get_mut(&fp) else {
            return;
        };
        let Some(pos) = chain.iter().position(|e| Arc::ptr_eq(&e.db, db)) else {
            return;
        };
        chain[pos].ref_cnt -= 1;
        if chain[pos].ref_cnt == 0 {
            chain.swap_remove(pos);
            if chain.is_empty() {
                table.entries.remove(&fp);
            }
            table.stats.evictions += 1;
            debug!(fingerprint = fp, "evicted pattern database");
        }
    }

    /// Clone the scratch prototype for a scanning thread. Takes only the
    /// prototype lock, so clones proceed concurrently with cache lookups.
    pub(crate) fn clone_thread_scratch(&self) -> Result<Scratch> {
        let proto = self.scratch_proto.lock().unwrap_or_else(|e| e.into_inner());
        let proto = proto.as_ref().ok_or(MpmError::NoScratchPrototype)?;
        proto
            .try_clone()
            .map_err(|e| MpmError::ScratchClone(e.to_string()))
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stats
            .clone()
    }

    /// Number of databases currently cached.
    pub fn cached_database_count(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Process-shutdown hook: drops the scratch prototype and clears the
    /// cache. Intended to be called once no context remains attached to
    /// any entry; entries that still have attached contexts are left in
    /// place and reported.
    pub fn global_cleanup(&self) {
        {
            let mut proto = self.scratch_proto.lock().unwrap_or_else(|e| e.into_inner());
            if proto.take().is_some() {
                debug!("released scratch prototype");
            }
        }

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let live: usize = table.entries.values().map(Vec::len).sum();
        if live > 0 {
            // Entries only exist while contexts hold references; leave them
            // for their owners to release.
            warn!(live, "database cache cleanup with contexts still attached");
        } else {
            table.entries.clear();
            debug!("cleared pattern database cache");
        }
    }
}

static GLOBAL_SERVICE: OnceLock<Arc<MpmService>> = OnceLock::new();

/// The process-wide default service used by [`crate::MpmContext::new`].
pub fn global_service() -> Arc<MpmService> {
    Arc::clone(GLOBAL_SERVICE.get_or_init(|| Arc::new(MpmService::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(defs: &[(&[u8], u32, u32)]) -> Vec<Pattern> {
        let mut v: Vec<Pattern> = defs
            .iter()
            .map(|&(bytes, id, sid)| Pattern::new(bytes, 0, 0, id, sid, false))
            .collect();
        compile::canonicalize(&mut v);
        v
    }

    #[test]
    fn test_compile_then_reuse() {
        let service = MpmService::with_config(MpmConfig::small());
        let set = pats(&[(b"abcd", 0, 1), (b"efgh", 1, 1)]);
        let fp = compile::fingerprint(&set);

        let db1 = service.fetch_or_compile(fp, set.clone()).unwrap();
        let db2 = service.fetch_or_compile(fp, set).unwrap();
        assert!(Arc::ptr_eq(&db1, &db2));

        let stats = service.stats();
        assert_eq!(stats.compilations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(service.cached_database_count(), 1);
    }

    #[test]
    fn test_release_evicts_at_zero() {
        let service = MpmService::with_config(MpmConfig::small());
        let set = pats(&[(b"abcd", 0, 1)]);
        let fp = compile::fingerprint(&set);

        let db1 = service.fetch_or_compile(fp, set.clone()).unwrap();
        let db2 = service.fetch_or_compile(fp, set.clone()).unwrap();

        service.release(fp, &db1);
        assert_eq!(service.cached_database_count(), 1);
        service.release(fp, &db2);
        assert_eq!(service.cached_database_count(), 0);
        assert_eq!(service.stats().evictions, 1);

        // A fresh fetch now compiles again.
        service.fetch_or_compile(fp, set).unwrap();
        assert_eq!(service.stats().compilations, 2);
    }

    #[test]
    fn test_distinct_sets_do_not_share() {
        let service = MpmService::with_config(MpmConfig::small());
        let a = pats(&[(b"abcd", 0, 1)]);
        let b = pats(&[(b"abce", 0, 1)]);
        service
            .fetch_or_compile(compile::fingerprint(&a), a)
            .unwrap();
        service
            .fetch_or_compile(compile::fingerprint(&b), b)
            .unwrap();
        assert_eq!(service.stats().compilations, 2);
        assert_eq!(service.cached_database_count(), 2);
    }

    #[test]
    fn test_scratch_prototype_lifecycle() {
        let service = MpmService::with_config(MpmConfig::small());
        assert_eq!(
            service.clone_thread_scratch().unwrap_err(),
            MpmError::NoScratchPrototype
        );

        let small = pats(&[(b"abcd", 0, 1)]);
        service
            .fetch_or_compile(compile::fingerprint(&small), small)
            .unwrap();
        let s1 = service.clone_thread_scratch().unwrap();
        assert_eq!(s1.capacity(), 1);

        // A larger database grows the prototype; the earlier clone is
        // unaffected.
        let big = pats(&[(b"abcd", 0, 1), (b"efgh", 1, 1), (b"ijkl", 2, 1)]);
        service
            .fetch_or_compile(compile::fingerprint(&big), big)
            .unwrap();
        let s2 = service.clone_thread_scratch().unwrap();
        assert_eq!(s1.capacity(), 1);
        assert_eq!(s2.capacity(), 3);
    }

    #[test]
    fn test_global_cleanup_preserves_live_entries() {
        let service = MpmService::with_config(MpmConfig::small());
        let set = pats(&[(b"abcd", 0, 1)]);
        let fp = compile::fingerprint(&set);
        let db = service.fetch_or_compile(fp, set).unwrap();

        service.global_cleanup();
        // Entry still referenced: left in place, but the prototype is gone.
        assert_eq!(service.cached_database_count(), 1);
        assert_eq!(
            service.clone_thread_scratch().unwrap_err(),
            MpmError::NoScratchPrototype
        );

        service.release(fp, &db);
        service.global_cleanup();
        assert_eq!(service.cached_database_count(), 0);
    }

    #[test]
    fn test_global_service_is_shared() {
        let a = global_service();
        let b = global_service();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
