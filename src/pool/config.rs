//! Dispatch configuration and worker-count resolution

use crate::core::{DispatchError, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host parallelism multiplier used when the worker cap is left at 0.
///
/// 1 suits CPU-bound processing; I/O-bound processors usually want 4.
pub const DEFAULT_AUTO_WORKER_MULTIPLIER: usize = 1;

/// Elements each worker should have before the pool path pays off.
pub const ELEMENTS_PER_WORKER: usize = 50;

/// Default thread name prefix for pool workers.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "dispatch-worker";

bitflags! {
    /// Behaviour switches for a run
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DispatchFlags: u32 {
        /// Do not call `Processor::get_element`; `process` receives `None`
        const SKIP_LOOKUP = 1 << 0;
        /// Stop feeding new elements after the first recorded failure
        const ABORT_ON_ERROR = 1 << 1;
    }
}

/// Element-count floor below which a run stays on the calling thread.
///
/// Serialized as a signed number: negative means [`Threshold::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "isize", into = "isize")]
pub enum Threshold {
    /// `workers * ELEMENTS_PER_WORKER`
    Auto,
    /// A fixed element count
    Elements(usize),
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::Elements(0)
    }
}

impl From<isize> for Threshold {
    /// Negative values mean [`Threshold::Auto`]
    fn from(value: isize) -> Self {
        if value < 0 {
            Threshold::Auto
        } else {
            Threshold::Elements(value as usize)
        }
    }
}

impl From<Threshold> for isize {
    fn from(threshold: Threshold) -> Self {
        match threshold {
            Threshold::Auto => -1,
            Threshold::Elements(n) => isize::try_from(n).unwrap_or(isize::MAX),
        }
    }
}

impl From<usize> for Threshold {
    fn from(value: usize) -> Self {
        Threshold::Elements(value)
    }
}

impl Threshold {
    /// Resolve against the worker count of a run
    pub fn resolve(self, workers: usize) -> usize {
        match self {
            Threshold::Auto => workers.saturating_mul(ELEMENTS_PER_WORKER),
            Threshold::Elements(n) => n,
        }
    }
}

/// Configuration for a dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum concurrent workers (0 = host parallelism * `auto_worker_multiplier`)
    pub worker_cap: usize,
    /// Element count below which the run is single-threaded
    pub multithreaded_threshold: Threshold,
    /// Behaviour flags
    pub flags: DispatchFlags,
    /// Multiplier applied to host parallelism when `worker_cap` is 0
    pub auto_worker_multiplier: usize,
    /// Thread name prefix for pool workers
    pub thread_name_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_cap: 0,
            multithreaded_threshold: Threshold::default(),
            flags: DispatchFlags::empty(),
            auto_worker_multiplier: DEFAULT_AUTO_WORKER_MULTIPLIER,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl DispatchConfig {
    /// Create a configuration with the given worker cap
    #[must_use]
    pub fn new(worker_cap: usize) -> Self {
        Self {
            worker_cap,
            ..Default::default()
        }
    }

    /// Set the worker cap (0 = automatic)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_worker_cap(mut self, cap: usize) -> Self {
        self.worker_cap = cap;
        self
    }

    /// Set the multithreading threshold
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        self.multithreaded_threshold = threshold.into();
        self
    }

    /// Replace all flags
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_flags(mut self, flags: DispatchFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Skip element lookup
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn skip_lookup(mut self) -> Self {
        self.flags |= DispatchFlags::SKIP_LOOKUP;
        self
    }

    /// Stop feeding elements after the first failure
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn abort_on_error(mut self) -> Self {
        self.flags |= DispatchFlags::ABORT_ON_ERROR;
        self
    }

    /// Set the host parallelism multiplier used for automatic worker counts
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_auto_worker_multiplier(mut self, multiplier: usize) -> Self {
        self.auto_worker_multiplier = multiplier;
        self
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auto_worker_multiplier == 0 {
            return Err(DispatchError::invalid_config(
                "auto_worker_multiplier",
                "Multiplier must be greater than 0",
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(DispatchError::invalid_config(
                "thread_name_prefix",
                "Thread name prefix must not be empty",
            ));
        }
        Ok(())
    }

    /// Resolve the worker count and execution mode for `element_count` elements
    pub fn plan(&self, element_count: usize) -> ExecutionPlan {
        self.plan_with_parallelism(element_count, num_cpus::get())
    }

    pub(crate) fn plan_with_parallelism(
        &self,
        element_count: usize,
        host_parallelism: usize,
    ) -> ExecutionPlan {
        if element_count == 0 {
            return ExecutionPlan {
                element_count,
                workers: 0,
                threshold: self.multithreaded_threshold.resolve(0),
                mode: ExecutionMode::Empty,
            };
        }

        let cap = if self.worker_cap == 0 {
            host_parallelism.saturating_mul(self.auto_worker_multiplier)
        } else {
            self.worker_cap
        };
        let workers = cap.clamp(1, element_count);
        let threshold = self.multithreaded_threshold.resolve(workers);

        let mode = if workers == 1 || element_count < threshold {
            ExecutionMode::Single
        } else {
            ExecutionMode::Pool
        };

        ExecutionPlan {
            element_count,
            workers: if mode == ExecutionMode::Single { 1 } else { workers },
            threshold,
            mode,
        }
    }
}

/// Which path a run takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// No elements; nothing runs
    Empty,
    /// Everything on the calling thread
    Single,
    /// Fanned out over pool workers
    Pool,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Empty => "empty",
            ExecutionMode::Single => "single",
            ExecutionMode::Pool => "pool",
        })
    }
}

/// Resolved shape of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Elements reported by the processor
    pub element_count: usize,
    /// Workers that will run (0 for an empty run, 1 for the single path)
    pub workers: usize,
    /// Resolved multithreading threshold
    pub threshold: usize,
    /// Chosen path
    pub mode: ExecutionMode,
}
