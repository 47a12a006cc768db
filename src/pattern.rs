//! Literal patterns and their match constraints.

/// Caller-assigned pattern id. Unique only within one context's numbering.
pub type PatternId = u32;

/// Identifier of a higher-level rule referencing one or more patterns.
pub type SigId = u32;

/// A literal byte pattern plus its match constraints.
///
/// Two patterns are distinct if bytes, case flag, offset, or depth differ,
/// even when the pattern id matches. One pattern may serve many signatures;
/// the signature-id set grows as duplicates of the pattern are inserted
/// under new signature ids.
///
/// The derived ordering is only used to put flattened pattern arrays into a
/// canonical order before fingerprinting; it carries no match semantics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pattern {
    /// Raw pattern bytes.
    pub bytes: Vec<u8>,
    /// Minimum offset, from buffer start, at which the pattern may begin.
    /// Zero means unconstrained.
    pub offset: u16,
    /// Number of bytes, counted from `offset`, within which the match must
    /// end. Zero means unconstrained.
    pub depth: u16,
    /// Caller-assigned pattern id.
    pub id: PatternId,
    /// Match independently of ASCII case.
    pub caseless: bool,
    /// Signature ids referencing this pattern, kept sorted and deduplicated.
    pub sids: Vec<SigId>,
}

impl Pattern {
    pub(crate) fn new(
        bytes: &[u8],
        offset: u16,
        depth: u16,
        id: PatternId,
        sid: SigId,
        caseless: bool,
    ) -> Self {
        Self {
            bytes: bytes.to_vec(),
            offset,
            depth,
            id,
            caseless,
            sids: vec![sid],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn has_offset(&self) -> bool {
        self.offset != 0
    }

    pub(crate) fn has_depth(&self) -> bool {
        self.depth != 0
    }

    /// Add a signature id to this pattern's set. Returns `true` if the set
    /// grew, `false` if the id was already present.
    pub(crate) fn add_sid(&mut self, sid: SigId) -> bool {
        match self.sids.binary_search(&sid) {
            Ok(_) => false,
            Err(pos) => {
                self.sids.insert(pos, sid);
                true
            }
        }
    }
}
