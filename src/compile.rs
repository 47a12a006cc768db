//! Compile-data assembly: canonicalization, fingerprinting, and rendering
//! registry patterns into matcher-engine input.
//!
//! The flattened pattern array is sorted into a canonical order before
//! fingerprinting so that logically identical pattern sets deduplicate in
//! the database cache regardless of the order rules were loaded in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::engine::{BlockDatabase, EngineError, ExprExt, ExprInfo};
use crate::pattern::Pattern;

/// A compiled pattern database: the engine database plus the ordered array
/// mapping the engine's internal match index back to the originating
/// pattern. Immutable once built.
#[derive(Debug)]
pub struct CompiledDatabase {
    engine_db: BlockDatabase,
    /// Index `i` resolves the engine's match id `i`.
    patterns: Vec<Pattern>,
    db_size: usize,
}

impl CompiledDatabase {
    pub(crate) fn engine_db(&self) -> &BlockDatabase {
        &self.engine_db
    }

    pub(crate) fn pattern(&self, engine_id: u32) -> &Pattern {
        &self.patterns[engine_id as usize]
    }

    pub(crate) fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn pattern_count(&self) -> u32 {
        self.patterns.len() as u32
    }

    /// Approximate size of the compiled engine database in bytes.
    pub fn size(&self) -> usize {
        self.db_size
    }
}

/// Sort a flattened pattern array into canonical order. Each pattern's
/// signature-id set is already sorted by construction.
pub(crate) fn canonicalize(patterns: &mut [Pattern]) {
    patterns.sort_unstable();
}

/// Fingerprint a canonically ordered pattern array. Combines the pattern
/// count with every field of every pattern, including the full signature-id
/// set, through an avalanching 64-bit hasher.
pub(crate) fn fingerprint(patterns: &[Pattern]) -> u64 {
    let mut hasher = DefaultHasher::new();
    patterns.len().hash(&mut hasher);
    for p in patterns {
        p.hash(&mut hasher);
    }
    hasher.finish()
}

/// Render the pattern array into engine compile input. Engine ids are array
/// indices, so match events resolve back through the same array.
pub(crate) fn build_exprs(patterns: &[Pattern]) -> Vec<ExprInfo> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let ext = if p.has_offset() || p.has_depth() {
                let mut ext = ExprExt::default();
                if p.has_offset() {
                    // The match must end at or after offset + length.
                    ext.min_offset = Some(p.offset as u64 + p.len() as u64);
                }
                if p.has_depth() {
                    // The match must end within offset + depth bytes.
                    ext.max_offset = Some(p.offset as u64 + p.depth as u64);
                }
                Some(ext)
            } else {
                None
            };
            ExprInfo {
                expression: crate::engine::render_literal(&p.bytes),
                caseless: p.caseless,
                single_match: true,
                id: i as u32,
                ext,
            }
        })
        .collect()
}

/// Compile a canonically ordered pattern array into a database.
pub(crate) fn compile_database(patterns: Vec<Pattern>) -> Result<CompiledDatabase, EngineError> {
    let exprs = build_exprs(&patterns);
    let engine_db = BlockDatabase::compile(&exprs)?;
    let db_size = engine_db.size();
    Ok(CompiledDatabase {
        engine_db,
        patterns,
        db_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(bytes: &[u8], offset: u16, depth: u16, id: u32, sid: u32) -> Pattern {
        Pattern::new(bytes, offset, depth, id, sid, false)
    }

    #[test]
    fn test_fingerprint_is_order_independent_after_canonicalize() {
        let mut a = vec![pat(b"abcd", 0, 0, 0, 1), pat(b"efgh", 0, 0, 1, 1)];
        let mut b = vec![pat(b"efgh", 0, 0, 1, 1), pat(b"abcd", 0, 0, 0, 1)];
        canonicalize(&mut a);
        canonicalize(&mut b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_covers_sid_set() {
        let a = vec![pat(b"abcd", 0, 0, 0, 1)];
        let mut with_extra_sid = vec![pat(b"abcd", 0, 0, 0, 1)];
        with_extra_sid[0].add_sid(2);
        assert_ne!(fingerprint(&a), fingerprint(&with_extra_sid));
    }

    #[test]
    fn test_fingerprint_covers_constraints() {
        let a = vec![pat(b"abcd", 0, 0, 0, 1)];
        let b = vec![pat(b"abcd", 2, 0, 0, 1)];
        let c = vec![pat(b"abcd", 0, 7, 0, 1)];
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_ne!(fingerprint(&b), fingerprint(&c));
    }

    #[test]
    fn test_build_exprs_constraint_mapping() {
        let exprs = build_exprs(&[pat(b"abcd", 2, 10, 0, 1)]);
        assert_eq!(exprs.len(), 1);
        let ext = exprs[0].ext.unwrap();
        assert_eq!(ext.min_offset, Some(6)); // offset + len
        assert_eq!(ext.max_offset, Some(12)); // offset + depth
        assert!(exprs[0].single_match);
    }

    #[test]
    fn test_build_exprs_unconstrained_has_no_ext() {
        let exprs = build_exprs(&[pat(b"abcd", 0, 0, 0, 1)]);
        assert!(exprs[0].ext.is_none());
    }

    #[test]
    fn test_engine_ids_are_array_indices() {
        let exprs = build_exprs(&[pat(b"aa", 0, 0, 7, 1), pat(b"bb", 0, 0, 3, 1)]);
        assert_eq!(exprs[0].id, 0);
        assert_eq!(exprs[1].id, 1);
    }

    #[test]
    fn test_compile_database_maps_indices_back() {
        let db = compile_database(vec![pat(b"abcd", 0, 0, 11, 5)]).unwrap();
        assert_eq!(db.pattern_count(), 1);
        assert_eq!(db.pattern(0).id, 11);
        assert_eq!(db.pattern(0).sids, vec![5]);
        assert!(db.size() > 0);
    }
}
