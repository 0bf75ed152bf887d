//! Outcome of a single dispatch run

use crate::core::{AggregatedError, DispatchError, Result};
use crate::pool::config::ExecutionPlan;
use crate::pool::worker::WorkerSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Everything observed during one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of the run, also present in log lines
    pub run_id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Time from start until all workers were joined
    pub elapsed: Duration,
    /// Resolved worker count and path
    pub plan: ExecutionPlan,
    /// Per-worker statistics, in worker-id order
    pub workers: Vec<WorkerSummary>,
    /// Whether the abort flag was raised
    pub aborted: bool,
    /// Failures recorded during the run
    pub errors: Option<AggregatedError>,
}

impl RunReport {
    /// Elements processed successfully
    pub fn processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed).sum()
    }

    /// Elements whose processing returned an error
    pub fn failed(&self) -> u64 {
        self.workers.iter().map(|w| w.failed).sum()
    }

    /// Elements whose processing panicked
    pub fn crashed(&self) -> u64 {
        self.workers.iter().map(|w| w.crashed).sum()
    }

    /// Elements handed to `process`
    pub fn attempted(&self) -> u64 {
        self.processed() + self.failed() + self.crashed()
    }

    /// Whether no failure was recorded
    pub fn is_success(&self) -> bool {
        self.errors.is_none()
    }

    /// `Ok(())` if nothing failed, otherwise [`DispatchError::Failed`]
    pub fn into_result(self) -> Result<()> {
        match self.errors {
            None => Ok(()),
            Some(errors) => Err(DispatchError::Failed(errors)),
        }
    }
}
