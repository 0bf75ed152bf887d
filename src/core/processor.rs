//! Processor trait and worker identifiers

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the execution context a [`Processor`] hook or call runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerId {
    /// The calling thread, used by the single-worker path
    Caller,
    /// A pool worker, numbered from 0
    Pool(usize),
}

impl WorkerId {
    /// Numeric id: -1 for the caller, 0.. for pool workers
    pub fn raw(self) -> isize {
        match self {
            WorkerId::Caller => -1,
            WorkerId::Pool(id) => id as isize,
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Caller-supplied element collection and per-element work.
///
/// A processor is shared by reference across every worker of a run, so all
/// methods take `&self`. Any mutation of the underlying elements during
/// `process` must be made thread-safe by the implementation.
///
/// # Example
///
/// ```rust
/// use rust_work_dispatch::prelude::*;
/// use std::sync::atomic::{AtomicI64, Ordering};
///
/// struct Negate {
///     data: Vec<AtomicI64>,
/// }
///
/// impl Processor for Negate {
///     type Payload = i64;
///
///     fn element_count(&self) -> usize {
///         self.data.len()
///     }
///
///     fn get_element(&self, index: usize) -> i64 {
///         self.data[index].load(Ordering::Relaxed)
///     }
///
///     fn process(&self, index: usize, payload: Option<i64>) -> Result<()> {
///         let value = payload.ok_or_else(|| DispatchError::element("missing payload"))?;
///         self.data[index].store(-value, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
pub trait Processor: Send + Sync {
    /// Data looked up for an element before it is processed
    type Payload: Send + 'static;

    /// Number of elements, fixed for the duration of a run
    fn element_count(&self) -> usize;

    /// Look up the payload for `index`.
    ///
    /// Called at most once per index, and never when lookup is skipped.
    fn get_element(&self, index: usize) -> Self::Payload;

    /// Called once on each worker before its first element
    fn worker_init(&self, _worker: WorkerId) {}

    /// Called once on each worker after its last element, including on abort or crash
    fn worker_finish(&self, _worker: WorkerId) {}

    /// Process one element.
    ///
    /// `payload` is `None` when lookup is skipped.
    ///
    /// # Errors
    ///
    /// A returned error is recorded against `index` in the run's aggregated error.
    fn process(&self, index: usize, payload: Option<Self::Payload>) -> Result<()>;
}

/// Processor built from an element count and a closure.
///
/// Lookup yields the index itself, so the closure sees `Some(index)` unless
/// lookup is skipped.
pub struct FnProcessor<F>
where
    F: Fn(usize) -> Result<()> + Send + Sync,
{
    count: usize,
    func: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(usize) -> Result<()> + Send + Sync,
{
    /// Create a processor over `count` elements
    pub fn new(count: usize, func: F) -> Self {
        Self { count, func }
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(usize) -> Result<()> + Send + Sync,
{
    type Payload = usize;

    fn element_count(&self) -> usize {
        self.count
    }

    fn get_element(&self, index: usize) -> usize {
        index
    }

    fn process(&self, index: usize, _payload: Option<usize>) -> Result<()> {
        (self.func)(index)
    }
}

impl<F> fmt::Debug for FnProcessor<F>
where
    F: Fn(usize) -> Result<()> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor")
            .field("count", &self.count)
            .finish()
    }
}
