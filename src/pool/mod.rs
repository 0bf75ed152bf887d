//! Dispatcher, configuration and worker implementations

pub mod config;
pub mod dispatcher;
pub mod report;
pub mod worker;

pub use config::{
    DispatchConfig, DispatchFlags, ExecutionMode, ExecutionPlan, Threshold,
    DEFAULT_AUTO_WORKER_MULTIPLIER, DEFAULT_THREAD_NAME_PREFIX, ELEMENTS_PER_WORKER,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use report::RunReport;
pub use worker::{Worker, WorkerStats, WorkerSummary};
