//! Caller-visible context: pattern loading, prepare, and search.
//!
//! An [`MpmContext`] is built in two phases. During the build phase it owns
//! a [`PatternRegistry`] and accepts case-sensitive and case-insensitive
//! pattern insertions. `prepare` flattens the registry, fetches or compiles
//! a shared database through the service, and attaches the context to the
//! resulting cache entry; from then on the context is read-only and safe to
//! share across scanning threads.
//!
//! Search is synchronous and blocking. Matches are delivered by resolving
//! the engine's match index through the database's index-to-pattern array
//! and appending every signature id owned by that pattern to the caller's
//! [`MatchQueue`]; callback ordering within one scan is engine-defined.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{global_service, MpmService};
use crate::compile::{self, CompiledDatabase};
use crate::error::Result;
use crate::pattern::{PatternId, SigId};
use crate::registry::PatternRegistry;
use crate::scratch::ThreadContext;

/// Append-only collector of signature ids reported by a search.
///
/// One match event can yield multiple signature ids: every id owned by the
/// matched pattern is appended. The queue imposes no ordering beyond append
/// order, which is engine-defined within one scan.
#[derive(Debug, Default, Clone)]
pub struct MatchQueue {
    sids: Vec<SigId>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sids: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push_sids(&mut self, sids: &[SigId]) {
        self.sids.extend_from_slice(sids);
    }

    /// All signature ids reported so far, in append order.
    pub fn sids(&self) -> &[SigId] {
        &self.sids
    }

    pub fn len(&self) -> usize {
        self.sids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sids.is_empty()
    }

    pub fn clear(&mut self) {
        self.sids.clear();
    }
}

/// Diagnostic snapshot of a context, printable via `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    /// Allocation count attributed to this context.
    pub memory_cnt: u32,
    /// Bytes attributed to this context.
    pub memory_size: usize,
    /// Unique patterns inserted.
    pub pattern_cnt: u32,
    /// Shortest pattern length, 0 if none.
    pub min_len: usize,
    /// Longest pattern length, 0 if none.
    pub max_len: usize,
    /// Compiled database size in bytes, if prepared with patterns.
    pub db_size: Option<usize>,
}

impl fmt::Display for ContextInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MPM Context Information:")?;
        writeln!(f, "Memory allocs:   {}", self.memory_cnt)?;
        writeln!(f, "Memory alloced:  {}", self.memory_size)?;
        writeln!(f, "Unique Patterns: {}", self.pattern_cnt)?;
        writeln!(f, "Smallest:        {}", self.min_len)?;
        writeln!(f, "Largest:         {}", self.max_len)?;
        match self.db_size {
            Some(size) => writeln!(f, "Database Size:   {size} bytes"),
            None => writeln!(f, "Database Size:   (not compiled)"),
        }
    }
}

/// Caller-visible handle bundling a build-phase registry and, after
/// prepare, one counted reference to a shared compiled database.
#[derive(Debug)]
pub struct MpmContext {
    service: Arc<MpmService>,
    registry: Option<PatternRegistry>,
    db: Option<Arc<CompiledDatabase>>,
    fingerprint: u64,
    pattern_cnt: u32,
    min_len: usize,
    max_len: usize,
    memory_cnt: u32,
    memory_size: usize,
}

impl Default for MpmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MpmContext {
    /// A context attached to the process-wide default service.
    pub fn new() -> Self {
        Self::with_service(global_service())
    }

    /// A context attached to an explicitly constructed service. Contexts
    /// sharing a service share its database cache and scratch prototype.
    pub fn with_service(service: Arc<MpmService>) -> Self {
        let registry = PatternRegistry::new(service.config().registry_buckets);
        Self {
            service,
            registry: Some(registry),
            db: None,
            fingerprint: 0,
            pattern_cnt: 0,
            min_len: 0,
            max_len: 0,
            memory_cnt: 0,
            memory_size: 0,
        }
    }

    /// Add a case-sensitive pattern.
    pub fn add_pattern_cs(
        &mut self,
        bytes: &[u8],
        offset: u16,
        depth: u16,
        id: PatternId,
        sid: SigId,
    ) {
        self.add_pattern(bytes, offset, depth, id, sid, false);
    }

    /// Add a case-insensitive pattern. Identical to the case-sensitive
    /// variant apart from the case flag.
    pub fn add_pattern_ci(
        &mut self,
        bytes: &[u8],
        offset: u16,
        depth: u16,
        id: PatternId,
        sid: SigId,
    ) {
        self.add_pattern(bytes, offset, depth, id, sid, true);
    }

    fn add_pattern(
        &mut self,
        bytes: &[u8],
        offset: u16,
        depth: u16,
        id: PatternId,
        sid: SigId,
        caseless: bool,
    ) {
        match self.registry.as_mut() {
            Some(registry) => registry.add(bytes, offset, depth, id, sid, caseless),
            None => warn!(id, sid, "pattern added after prepare; ignored"),
        }
    }

    /// Compile the accumulated patterns, or attach to an already-compiled
    /// shared database for an identical pattern set.
    ///
    /// With zero patterns this succeeds trivially and no database is
    /// created. On compile failure the error carries the engine's
    /// diagnostic and the context is left without a usable database.
    /// Calling prepare again is a no-op.
    pub fn prepare(&mut self) -> Result<()> {
        let Some(registry) = self.registry.take() else {
            return Ok(());
        };

        self.pattern_cnt = registry.pattern_count();
        self.min_len = registry.min_len();
        self.max_len = registry.max_len();
        self.memory_cnt = registry.alloc_cnt();
        self.memory_size = registry.alloc_bytes();

        if self.pattern_cnt == 0 {
            debug!("no patterns supplied to this context");
            return Ok(());
        }

        let mut patterns = registry.into_patterns();
        compile::canonicalize(&mut patterns);
        let fp = compile::fingerprint(&patterns);

        let db = self.service.fetch_or_compile(fp, patterns)?;
        self.fingerprint = fp;
        self.db = Some(db);
        Ok(())
    }

    /// Scan `buf`, appending matched signature ids to `queue`. Returns the
    /// number of match events.
    ///
    /// A zero-length buffer returns 0 without invoking the engine, as does
    /// a context prepared with zero patterns.
    ///
    /// # Panics
    ///
    /// Panics on a scan error other than clean completion: such an error
    /// means the database or scratch is unusable, and partial results in a
    /// detection path are worse than stopping.
    pub fn search(
        &self,
        thread_ctx: &mut ThreadContext,
        queue: &mut MatchQueue,
        buf: &[u8],
    ) -> u32 {
        if buf.is_empty() {
            return 0;
        }
        let Some(db) = self.db.as_ref() else {
            return 0;
        };

        let mut match_count = 0u32;
        db.engine_db()
            .scan(buf, thread_ctx.scratch_mut(), |engine_id, _end| {
                let pattern = db.pattern(engine_id);
                queue.push_sids(&pattern.sids);
                match_count += 1;
            })
            .unwrap_or_else(|e| panic!("unrecoverable scan failure: {e}"));
        match_count
    }

    /// Number of unique patterns in this context. Valid after prepare; the
    /// running count is available on the registry before that.
    pub fn pattern_count(&self) -> u32 {
        match self.registry.as_ref() {
            Some(registry) => registry.pattern_count(),
            None => self.pattern_cnt,
        }
    }

    /// Whether prepare attached a compiled database.
    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    /// Diagnostic snapshot of counts and sizes.
    pub fn info(&self) -> ContextInfo {
        match self.registry.as_ref() {
            Some(registry) => ContextInfo {
                memory_cnt: registry.alloc_cnt(),
                memory_size: registry.alloc_bytes(),
                pattern_cnt: registry.pattern_count(),
                min_len: registry.min_len(),
                max_len: registry.max_len(),
                db_size: None,
            },
            None => ContextInfo {
                memory_cnt: self.memory_cnt,
                memory_size: self.memory_size,
                pattern_cnt: self.pattern_cnt,
                min_len: self.min_len,
                max_len: self.max_len,
                db_size: self.db.as_ref().map(|db| db.size()),
            },
        }
    }

    /// Print the diagnostic snapshot to stdout.
    pub fn print_info(&self) {
        print!("{}", self.info());
    }
}

impl Drop for MpmContext {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            self.service.release(self.fingerprint, &db);
        }
    }
}
