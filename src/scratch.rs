//! Per-thread scan workspace.
//!
//! Every scanning worker owns one [`ThreadContext`], cloned from the
//! process-wide scratch prototype held by the service. The scan workspace
//! is stateful and must never be used by two concurrent scans; ownership by
//! a single worker enforces that at the type level.

use std::sync::Arc;

use crate::cache::MpmService;
use crate::engine::Scratch;
use crate::error::Result;

/// A worker thread's private scan workspace plus its accounting.
#[derive(Debug)]
pub struct ThreadContext {
    scratch: Scratch,
    scratch_size: usize,
    memory_cnt: u32,
    memory_size: usize,
}

impl ThreadContext {
    /// Clone the service's scratch prototype for this thread.
    ///
    /// Fails with [`crate::MpmError::NoScratchPrototype`] if no pattern
    /// database has been compiled in this process, and with
    /// [`crate::MpmError::ScratchClone`] if the engine cannot clone the
    /// prototype. Neither has a fallback: a worker without scratch cannot
    /// scan.
    pub fn init(service: &Arc<MpmService>) -> Result<Self> {
        let scratch = service.clone_thread_scratch()?;
        let scratch_size = scratch.size();
        Ok(Self {
            scratch,
            scratch_size,
            memory_cnt: 1,
            memory_size: scratch_size,
        })
    }

    pub(crate) fn scratch_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }

    /// Size of this thread's scratch clone in bytes.
    pub fn scratch_size(&self) -> usize {
        self.scratch_size
    }

    /// Allocation count attributed to this thread context.
    pub fn memory_cnt(&self) -> u32 {
        self.memory_cnt
    }

    /// Bytes attributed to this thread context.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }
}
