//! # Rust Work Dispatch
//!
//! Process every element of a fixed-size collection exactly once, either on the
//! calling thread or across a bounded pool of worker threads, chosen
//! automatically from the element count and a configurable threshold.
//!
//! ## Features
//!
//! - **Automatic path selection**: single-threaded below a threshold, pooled above it
//! - **Bounded worker pool**: worker count capped by configuration and element count
//! - **Deterministic shutdown**: stop marker, single acknowledgment, then queue close
//! - **Crash isolation**: panics in processing are caught at the worker boundary
//! - **Error aggregation**: every failed element reported in one composite error
//! - **Cooperative abort**: optionally stop feeding elements after the first failure
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_work_dispatch::prelude::*;
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! struct Negate {
//!     data: Vec<AtomicI64>,
//! }
//!
//! impl Processor for Negate {
//!     type Payload = i64;
//!
//!     fn element_count(&self) -> usize {
//!         self.data.len()
//!     }
//!
//!     fn get_element(&self, index: usize) -> i64 {
//!         self.data[index].load(Ordering::Relaxed)
//!     }
//!
//!     fn process(&self, index: usize, payload: Option<i64>) -> Result<()> {
//!         let value = payload.unwrap_or_default();
//!         self.data[index].store(-value, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let negate = Arc::new(Negate {
//!     data: (0..10_000).map(AtomicI64::new).collect(),
//! });
//!
//! let dispatcher = Dispatcher::builder()
//!     .shared_processor(Arc::clone(&negate))
//!     .worker_cap(8)
//!     .build()?;
//! dispatcher.run()?;
//!
//! assert_eq!(negate.data[42].load(Ordering::Relaxed), -42);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use rust_work_dispatch::prelude::*;
//!
//! let config = DispatchConfig::new(0)          // 0 = host parallelism
//!     .with_auto_worker_multiplier(4)          // I/O-bound work
//!     .with_threshold(-1isize)                 // 50 elements per worker
//!     .abort_on_error();
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Run Reports
//!
//! ```rust
//! use rust_work_dispatch::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let processor = FnProcessor::new(500, |i| {
//!     if i % 100 == 7 {
//!         Err(DispatchError::element("not divisible"))
//!     } else {
//!         Ok(())
//!     }
//! });
//! let dispatcher = Dispatcher::builder().processor(processor).worker_cap(4).build()?;
//!
//! let report = dispatcher.run_report()?;
//! assert_eq!(report.failed(), 5);
//! assert_eq!(report.workers.len(), 4);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;

pub use core::{AggregatedError, DispatchError, FnProcessor, Processor, Result, WorkerId};
pub use pool::{DispatchConfig, DispatchFlags, Dispatcher, DispatcherBuilder, RunReport, Threshold};
