//! # MPM Engine
//!
//! A multi-pattern matcher front-end: literal byte patterns with match
//! constraints are accumulated into a context, deduplicated, compiled into
//! a searchable database, and cached process-wide so that identical pattern
//! sets never compile twice. Scanning threads clone a shared scratch
//! prototype and run synchronous searches that resolve match events back to
//! signature ids.
//!
//! ## Quick Start
//!
//! ```rust
//! use mpm_engine::{MatchQueue, MpmContext, ThreadContext};
//! use mpm_engine::{MpmConfig, MpmService};
//! use std::sync::Arc;
//!
//! let service = Arc::new(MpmService::with_config(MpmConfig::small()));
//!
//! // Build phase: load patterns, then prepare.
//! let mut ctx = MpmContext::with_service(Arc::clone(&service));
//! ctx.add_pattern_cs(b"abcd", 0, 0, 0, 100);
//! ctx.add_pattern_ci(b"WXYZ", 0, 0, 1, 200);
//! ctx.prepare()?;
//!
//! // Per worker thread: clone scratch, then scan.
//! let mut thread_ctx = ThreadContext::init(&service)?;
//! let mut queue = MatchQueue::new();
//! let matches = ctx.search(&mut thread_ctx, &mut queue, b"..abcd..wxyz..");
//! assert_eq!(matches, 2);
//! assert_eq!(queue.len(), 2);
//! # Ok::<(), mpm_engine::MpmError>(())
//! ```
//!
//! ## Shared databases
//!
//! Two contexts prepared from element-wise identical pattern sets attach to
//! one cached database: the second `prepare` is a cache hit, not a second
//! compilation. Entries are reference counted and evicted when their last
//! context is dropped.
//!
//! ## Threading model
//!
//! Contexts and their databases are read-only after `prepare` and safe to
//! share across workers. The scan workspace is stateful, so every worker
//! owns a private [`ThreadContext`]. Search calls are synchronous and
//! blocking with no suspension point; callers needing latency bounds must
//! bound buffer length externally.

pub mod cache;
pub mod compile;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod registry;
pub mod scratch;

// Caller-facing surface
pub use cache::{global_service, CacheStats, MpmService};
pub use compile::CompiledDatabase;
pub use config::MpmConfig;
pub use context::{ContextInfo, MatchQueue, MpmContext};
pub use error::{MpmError, Result};
pub use pattern::{Pattern, PatternId, SigId};
pub use registry::PatternRegistry;
pub use scratch::ThreadContext;

// Matcher engine contract, for embedders that drive the engine directly.
pub use engine::{BlockDatabase, EngineError, ExprExt, ExprInfo, Scratch};
