//! Matcher engine facade: block-mode literal database, scratch, and scan.
//!
//! This module owns the boundary between the MPM front-end and the actual
//! substring automaton. The automaton itself comes from the `aho-corasick`
//! crate; this facade layers the match semantics the front-end compiles
//! against on top of the raw hit stream:
//!
//! - per-expression case sensitivity (the automaton is built
//!   ASCII-case-insensitively; case-sensitive expressions are verified
//!   against the matched bytes),
//! - extended end-offset constraints (minimum/maximum match end),
//! - stop-after-first-match-per-expression suppression, tracked in the
//!   per-thread [`Scratch`].
//!
//! Expressions arrive in escaped literal form: every byte rendered as a
//! `\xHH` escape, which keeps the input unambiguous regardless of content.
//!
//! Scratch is stateful and must not be shared between concurrent scans.
//! Callers allocate one prototype per process, size it to the largest
//! database seen, and clone it per scanning thread.

use aho_corasick::{AhoCorasick, MatchKind};
use thiserror::Error;

/// Errors reported by the matcher engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The expression set could not be compiled into a database.
    #[error("{0}")]
    Compile(String),

    /// The scratch handed to a scan is too small for the database, meaning
    /// it was not cloned from a prototype covering this database.
    #[error("scratch too small for database: capacity {capacity}, need {needed}")]
    ScratchTooSmall { capacity: usize, needed: usize },
}

/// Extended match constraints for one expression.
///
/// Offsets are measured from the start of the scanned buffer to the *end*
/// of the match, mirroring the end-anchored constraint model of block-mode
/// matchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExprExt {
    /// A match must end at or after this offset.
    pub min_offset: Option<u64>,
    /// A match must end at or before this offset.
    pub max_offset: Option<u64>,
}

/// One compile-input expression: escaped literal, flags, caller id, and
/// optional extended constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprInfo {
    /// Literal in escaped form: each byte rendered as `\xHH`.
    pub expression: String,
    /// Match independently of ASCII case.
    pub caseless: bool,
    /// Report at most one match for this expression per scan.
    pub single_match: bool,
    /// Caller-chosen id reported by the match callback.
    pub id: u32,
    /// End-offset window, if any.
    pub ext: Option<ExprExt>,
}

/// Per-expression metadata kept alongside the automaton for verification.
#[derive(Debug, Clone)]
struct ExprMeta {
    literal: Vec<u8>,
    caseless: bool,
    single_match: bool,
    id: u32,
    ext: ExprExt,
}

/// A compiled block-mode literal database.
///
/// Immutable after compile; safe to share across scanning threads as long
/// as each thread brings its own [`Scratch`].
#[derive(Debug)]
pub struct BlockDatabase {
    automaton: AhoCorasick,
    exprs: Vec<ExprMeta>,
}

impl BlockDatabase {
    /// Compile a set of expressions into a searchable database.
    ///
    /// Fails if the expression set is empty, an expression is not in valid
    /// `\xHH` escaped form, or the automaton build is rejected.
    pub fn compile(exprs: &[ExprInfo]) -> Result<Self, EngineError> {
        if exprs.is_empty() {
            return Err(EngineError::Compile("no expressions supplied".to_string()));
        }

        let mut metas = Vec::with_capacity(exprs.len());
        for e in exprs {
            let literal = parse_escaped_literal(&e.expression)?;
            if literal.is_empty() {
                return Err(EngineError::Compile(format!(
                    "empty expression for id {}",
                    e.id
                )));
            }
            metas.push(ExprMeta {
                literal,
                caseless: e.caseless,
                single_match: e.single_match,
                id: e.id,
                ext: e.ext.unwrap_or_default(),
            });
        }

        // One automaton over all expressions. Built caseless; case-sensitive
        // expressions are verified against the matched bytes at scan time.
        // Standard match kind is required for overlapping iteration.
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(metas.iter().map(|m| m.literal.as_slice()))
            .map_err(|e| EngineError::Compile(e.to_string()))?;

        Ok(Self {
            automaton,
            exprs: metas,
        })
    }

    /// Number of expressions compiled into this database.
    pub fn expression_count(&self) -> usize {
        self.exprs.len()
    }

    /// Approximate heap size of the database in bytes.
    pub fn size(&self) -> usize {
        let meta_bytes: usize = self
            .exprs
            .iter()
            .map(|m| m.literal.len() + std::mem::size_of::<ExprMeta>())
            .sum();
        self.automaton.memory_usage() + meta_bytes
    }

    /// Scan `buf`, invoking `on_match(id, end_offset)` once per reported
    /// match. Returns a clean `Ok(())` whether or not anything matched.
    ///
    /// The scratch must have been allocated (or cloned from a prototype
    /// allocated) for a database at least this large.
    pub fn scan<F>(
        &self,
        buf: &[u8],
        scratch: &mut Scratch,
        mut on_match: F,
    ) -> Result<(), EngineError>
    where
        F: FnMut(u32, u64),
    {
        if scratch.capacity() < self.exprs.len() {
            return Err(EngineError::ScratchTooSmall {
                capacity: scratch.capacity(),
                needed: self.exprs.len(),
            });
        }
        scratch.reset();

        for m in self.automaton.find_overlapping_iter(buf) {
            let idx = m.pattern().as_usize();
            let meta = &self.exprs[idx];

            if meta.single_match && scratch.seen[idx] {
                continue;
            }
            // The automaton is caseless; re-check exact bytes for
            // case-sensitive expressions.
            if !meta.caseless && buf[m.start()..m.end()] != meta.literal[..] {
                continue;
            }
            let end = m.end() as u64;
            if let Some(min) = meta.ext.min_offset {
                if end < min {
                    continue;
                }
            }
            if let Some(max) = meta.ext.max_offset {
                if end > max {
                    continue;
                }
            }

            if meta.single_match {
                scratch.seen[idx] = true;
                scratch.touched.push(idx as u32);
            }
            on_match(meta.id, end);
        }

        Ok(())
    }
}

/// Mutable per-scan workspace.
///
/// Tracks which expressions have already fired within one scan so that
/// single-match suppression works without allocating on the hot path. The
/// seen-set is cleared in O(expressions fired) at the start of each scan
/// via the touched list, not O(capacity).
#[derive(Debug)]
pub struct Scratch {
    seen: Vec<bool>,
    touched: Vec<u32>,
}

impl Scratch {
    /// Allocate scratch sized for `db`.
    pub fn alloc(db: &BlockDatabase) -> Self {
        Self {
            seen: vec![false; db.expression_count()],
            touched: Vec::with_capacity(db.expression_count().min(64)),
        }
    }

    /// Grow this scratch so it also covers `db`. Used on the process-wide
    /// prototype when a larger database is compiled.
    pub fn grow_for(&mut self, db: &BlockDatabase) {
        if self.seen.len() < db.expression_count() {
            self.seen.resize(db.expression_count(), false);
        }
    }

    /// Clone this scratch for use by another thread.
    pub fn try_clone(&self) -> Result<Self, EngineError> {
        Ok(Self {
            seen: vec![false; self.seen.len()],
            touched: Vec::with_capacity(self.touched.capacity()),
        })
    }

    /// Number of expressions this scratch can track.
    pub fn capacity(&self) -> usize {
        self.seen.len()
    }

    /// Approximate heap size in bytes.
    pub fn size(&self) -> usize {
        self.seen.capacity() + self.touched.capacity() * std::mem::size_of::<u32>()
    }

    fn reset(&mut self) {
        for &idx in &self.touched {
            self.seen[idx as usize] = false;
        }
        self.touched.clear();
    }
}

/// Render raw bytes into the escaped literal form accepted by
/// [`BlockDatabase::compile`]: every byte becomes `\xHH`.
pub fn render_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for b in bytes {
        out.push_str(&format!("\\x{b:02x}"));
    }
    out
}

fn parse_escaped_literal(expr: &str) -> Result<Vec<u8>, EngineError> {
    let raw = expr.as_bytes();
    if raw.len() % 4 != 0 {
        return Err(EngineError::Compile(format!(
            "malformed escaped literal: {expr}"
        )));
    }
    let mut out = Vec::with_capacity(raw.len() / 4);
    for chunk in raw.chunks_exact(4) {
        if chunk[0] != b'\\' || chunk[1] != b'x' {
            return Err(EngineError::Compile(format!(
                "malformed escaped literal: {expr}"
            )));
        }
        let hex = std::str::from_utf8(&chunk[2..4])
            .map_err(|_| EngineError::Compile(format!("malformed escaped literal: {expr}")))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|_| EngineError::Compile(format!("malformed escaped literal: {expr}")))?;
        out.push(byte);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(lit: &[u8], caseless: bool, id: u32, ext: Option<ExprExt>) -> ExprInfo {
        ExprInfo {
            expression: render_literal(lit),
            caseless,
            single_match: true,
            id,
            ext,
        }
    }

    fn scan_ids(db: &BlockDatabase, buf: &[u8]) -> Vec<u32> {
        let mut scratch = Scratch::alloc(db);
        let mut ids = Vec::new();
        db.scan(buf, &mut scratch, |id, _| ids.push(id)).unwrap();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_render_and_parse_roundtrip() {
        let bytes = b"ab\x00\xff Z";
        let rendered = render_literal(bytes);
        assert_eq!(&rendered[..4], "\\x61");
        assert_eq!(parse_escaped_literal(&rendered).unwrap(), bytes);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_escaped_literal("abc").is_err());
        assert!(parse_escaped_literal("\\xzz").is_err());
        assert!(parse_escaped_literal("x\\41x\\41").is_err());
    }

    #[test]
    fn test_compile_empty_set_fails() {
        let err = BlockDatabase::compile(&[]).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn test_case_sensitive_verification() {
        let db = BlockDatabase::compile(&[expr(b"ABCD", false, 0, None)]).unwrap();
        assert_eq!(scan_ids(&db, b"xxABCDyy"), vec![0]);
        assert!(scan_ids(&db, b"xxabcdyy").is_empty());
    }

    #[test]
    fn test_caseless_match() {
        let db = BlockDatabase::compile(&[expr(b"ABCD", true, 0, None)]).unwrap();
        assert_eq!(scan_ids(&db, b"xxabcdyy"), vec![0]);
    }

    #[test]
    fn test_single_match_suppression() {
        let db = BlockDatabase::compile(&[expr(b"aa", false, 0, None)]).unwrap();
        // "aaaa" contains three overlapping occurrences; single-match
        // reports one.
        assert_eq!(scan_ids(&db, b"aaaa"), vec![0]);
    }

    #[test]
    fn test_end_offset_window() {
        let ext = ExprExt {
            min_offset: Some(4),
            max_offset: Some(6),
        };
        let db = BlockDatabase::compile(&[expr(b"cd", false, 0, Some(ext))]).unwrap();
        assert_eq!(scan_ids(&db, b"xxcdxx"), vec![0]); // ends at 4
        assert!(scan_ids(&db, b"cdxxxx").is_empty()); // ends at 2 < min
        assert!(scan_ids(&db, b"xxxxxcd").is_empty()); // ends at 7 > max
    }

    #[test]
    fn test_scan_rejects_undersized_scratch() {
        let small = BlockDatabase::compile(&[expr(b"ab", false, 0, None)]).unwrap();
        let big = BlockDatabase::compile(&[
            expr(b"ab", false, 0, None),
            expr(b"cd", false, 1, None),
        ])
        .unwrap();
        let mut scratch = Scratch::alloc(&small);
        let err = big.scan(b"abcd", &mut scratch, |_, _| {}).unwrap_err();
        assert!(matches!(err, EngineError::ScratchTooSmall { .. }));
    }

    #[test]
    fn test_scratch_grow_and_clone() {
        let small = BlockDatabase::compile(&[expr(b"ab", false, 0, None)]).unwrap();
        let big = BlockDatabase::compile(&[
            expr(b"ab", false, 0, None),
            expr(b"cd", false, 1, None),
        ])
        .unwrap();

        let mut proto = Scratch::alloc(&small);
        proto.grow_for(&big);
        assert_eq!(proto.capacity(), 2);

        let mut clone = proto.try_clone().unwrap();
        assert_eq!(clone.capacity(), 2);
        let mut hits = 0;
        big.scan(b"abcd", &mut clone, |_, _| hits += 1).unwrap();
        assert_eq!(hits, 2);
    }

    #[test]
    fn test_scratch_reuse_across_scans() {
        let db = BlockDatabase::compile(&[expr(b"ab", false, 0, None)]).unwrap();
        let mut scratch = Scratch::alloc(&db);
        for _ in 0..3 {
            let mut hits = 0;
            db.scan(b"abab", &mut scratch, |_, _| hits += 1).unwrap();
            // Seen-set resets between scans, so each scan fires once.
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn test_match_end_offsets_reported() {
        let db = BlockDatabase::compile(&[expr(b"cd", false, 9, None)]).unwrap();
        let mut scratch = Scratch::alloc(&db);
        let mut ends = Vec::new();
        db.scan(b"xxcdxx", &mut scratch, |id, end| {
            assert_eq!(id, 9);
            ends.push(end);
        })
        .unwrap();
        assert_eq!(ends, vec![4]);
    }

    #[test]
    fn test_database_size_nonzero() {
        let db = BlockDatabase::compile(&[expr(b"abcd", false, 0, None)]).unwrap();
        assert!(db.size() > 0);
    }
}
