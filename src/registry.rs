//! Build-phase pattern registry with hash-bucket deduplication.
//!
//! The registry exists only between context creation and prepare. Patterns
//! live in an arena; a bucket table of arena indices, keyed by a cheap
//! prefix hash, speeds up duplicate detection during rule loading. The
//! registry is thread-confined: it is populated by a single builder thread
//! and consumed whole by prepare.

use crate::pattern::{Pattern, PatternId, SigId};

/// Deduplicating store of patterns accumulated before prepare.
#[derive(Debug)]
pub struct PatternRegistry {
    /// Pattern arena; bucket chains hold indices into it.
    patterns: Vec<Pattern>,
    buckets: Vec<Vec<usize>>,
    min_len: usize,
    max_len: usize,
    /// Allocation accounting for diagnostics: count and total bytes of
    /// pattern storage owned by this registry.
    alloc_cnt: u32,
    alloc_bytes: usize,
}

impl PatternRegistry {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            patterns: Vec::new(),
            buckets: vec![Vec::new(); bucket_count.max(1)],
            min_len: 0,
            max_len: 0,
            alloc_cnt: 0,
            alloc_bytes: 0,
        }
    }

    /// Cheap prefix hash: length and the first two bytes. Only spreads
    /// build-time inserts; it has no effect on match behavior.
    fn bucket_of(&self, bytes: &[u8]) -> usize {
        let mut hash = bytes.len() * bytes[0] as usize;
        if bytes.len() > 1 {
            hash += bytes[1] as usize;
        }
        hash % self.buckets.len()
    }

    /// Add a pattern, deduplicating against previous inserts.
    ///
    /// A zero-length pattern is a benign no-op. Re-adding an identical
    /// pattern only grows its signature-id set (and only when `sid` is new
    /// to it). Full equality requires identical id, offset, depth, case
    /// flag, and byte content; anchoring alters match semantics even for
    /// identical literals.
    pub fn add(
        &mut self,
        bytes: &[u8],
        offset: u16,
        depth: u16,
        id: PatternId,
        sid: SigId,
        caseless: bool,
    ) {
        if bytes.is_empty() {
            return;
        }

        let bucket = self.bucket_of(bytes);
        for &idx in &self.buckets[bucket] {
            let p = &self.patterns[idx];
            if p.id == id
                && p.offset == offset
                && p.depth == depth
                && p.caseless == caseless
                && p.bytes == bytes
            {
                self.patterns[idx].add_sid(sid);
                return;
            }
        }

        let p = Pattern::new(bytes, offset, depth, id, sid, caseless);
        self.alloc_cnt += 2; // pattern node + copied bytes
        self.alloc_bytes += std::mem::size_of::<Pattern>() + p.len();

        if self.max_len < p.len() {
            self.max_len = p.len();
        }
        if self.min_len == 0 || self.min_len > p.len() {
            self.min_len = p.len();
        }

        self.buckets[bucket].push(self.patterns.len());
        self.patterns.push(p);
    }

    /// Number of unique patterns held.
    pub fn pattern_count(&self) -> u32 {
        self.patterns.len() as u32
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub(crate) fn alloc_cnt(&self) -> u32 {
        self.alloc_cnt
    }

    pub(crate) fn alloc_bytes(&self) -> usize {
        self.alloc_bytes
    }

    /// Consume the registry, yielding the flattened pattern array. The
    /// bucket table is discarded; callers canonicalize the order before
    /// fingerprinting.
    pub(crate) fn into_patterns(self) -> Vec<Pattern> {
        self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PatternRegistry {
        PatternRegistry::new(64)
    }

    #[test]
    fn test_empty_pattern_is_noop() {
        let mut r = registry();
        r.add(b"", 0, 0, 0, 0, false);
        assert_eq!(r.pattern_count(), 0);
        assert_eq!(r.min_len(), 0);
    }

    #[test]
    fn test_distinct_patterns_accumulate() {
        let mut r = registry();
        r.add(b"abcd", 0, 0, 0, 1, false);
        r.add(b"efgh", 0, 0, 1, 1, false);
        assert_eq!(r.pattern_count(), 2);
        assert_eq!(r.min_len(), 4);
        assert_eq!(r.max_len(), 4);
    }

    #[test]
    fn test_duplicate_grows_sid_set_only() {
        let mut r = registry();
        r.add(b"abcd", 0, 0, 0, 1, false);
        r.add(b"abcd", 0, 0, 0, 2, false);
        assert_eq!(r.pattern_count(), 1);
        let patterns = r.into_patterns();
        assert_eq!(patterns[0].sids, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_sid_is_noop() {
        let mut r = registry();
        r.add(b"abcd", 0, 0, 0, 1, false);
        r.add(b"abcd", 0, 0, 0, 1, false);
        let patterns = r.into_patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].sids, vec![1]);
    }

    #[test]
    fn test_anchoring_distinguishes_identical_literals() {
        let mut r = registry();
        r.add(b"abcd", 0, 0, 0, 1, false);
        r.add(b"abcd", 2, 0, 0, 1, false);
        r.add(b"abcd", 0, 8, 0, 1, false);
        r.add(b"abcd", 0, 0, 0, 1, true);
        assert_eq!(r.pattern_count(), 4);
    }

    #[test]
    fn test_min_max_length_tracking() {
        let mut r = registry();
        r.add(b"ab", 0, 0, 0, 1, false);
        r.add(b"abcdefgh", 0, 0, 1, 1, false);
        r.add(b"abc", 0, 0, 2, 1, false);
        assert_eq!(r.min_len(), 2);
        assert_eq!(r.max_len(), 8);
    }

    #[test]
    fn test_accounting_tracks_unique_inserts() {
        let mut r = registry();
        r.add(b"abcd", 0, 0, 0, 1, false);
        let after_first = r.alloc_bytes();
        r.add(b"abcd", 0, 0, 0, 2, false); // duplicate: no new allocation
        assert_eq!(r.alloc_bytes(), after_first);
        assert_eq!(r.alloc_cnt(), 2);
    }
}
