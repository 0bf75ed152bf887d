//! Core types and traits for the dispatch system

pub mod aggregate;
pub mod crash;
pub mod error;
pub mod processor;

pub use aggregate::{AggregatedError, ErrorCollector, ErrorKind, ErrorRecord};
pub use crash::CrashFault;
pub use error::{DispatchError, Result};
pub use processor::{FnProcessor, Processor, WorkerId};
