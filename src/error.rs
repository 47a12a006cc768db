//! Error types for the MPM engine crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MpmError>;

/// Errors surfaced by the MPM front-end.
///
/// Benign conditions (duplicate pattern insertion, duplicate signature id,
/// zero-length pattern) never appear here; they are absorbed silently at the
/// registry. Scan failures do not appear here either: a scan error other
/// than a clean completion indicates a corrupted database or scratch region
/// and aborts instead of yielding partial matches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpmError {
    /// The matcher engine rejected the pattern set; carries the engine's
    /// diagnostic message. Recoverable at the prepare call boundary: the
    /// context is left without a usable database.
    #[error("pattern database compile failed: {0}")]
    Compile(String),

    /// Thread scratch was requested before any pattern database had been
    /// compiled in this process, so there is no prototype to clone.
    #[error("no scratch prototype: no pattern database has been compiled")]
    NoScratchPrototype,

    /// The matcher engine failed to clone the scratch prototype.
    #[error("unable to clone scratch prototype: {0}")]
    ScratchClone(String),
}
