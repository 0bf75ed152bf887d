//! Convenient re-exports for common types and traits

pub use crate::core::{
    AggregatedError, DispatchError, ErrorKind, ErrorRecord, FnProcessor, Processor, Result,
    WorkerId,
};
pub use crate::pool::{
    DispatchConfig, DispatchFlags, Dispatcher, DispatcherBuilder, ExecutionMode, RunReport,
    Threshold,
};
