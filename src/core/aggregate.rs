//! Per-run collection of element failures
//!
//! Workers record failures into a shared [`ErrorCollector`]. Once every worker
//! has been joined the collector is turned into a single [`AggregatedError`],
//! or nothing at all when every element succeeded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an element failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// `Processor::process` returned an error
    Failed,
    /// `Processor::process` panicked and the panic was caught at the worker boundary
    Crashed,
}

/// A single failed element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Index of the element that failed
    pub index: usize,
    /// Rendered error message
    pub message: String,
    /// Failure kind
    pub kind: ErrorKind,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.message)
    }
}

/// Composite error holding every failure recorded during one run.
///
/// Never empty: a run without failures produces no `AggregatedError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedError {
    records: Vec<ErrorRecord>,
}

impl AggregatedError {
    /// All records, ordered by element index
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Number of failed elements
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false, kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices of failed elements in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.iter().map(|r| r.index)
    }

    /// Whether the element at `index` failed
    pub fn contains_index(&self, index: usize) -> bool {
        self.records
            .binary_search_by_key(&index, |r| r.index)
            .is_ok()
    }

    /// Number of records caused by caught panics
    pub fn crashed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == ErrorKind::Crashed)
            .count()
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} element(s) failed: ", self.records.len())?;
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", record)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Thread-safe accumulator of [`ErrorRecord`]s
#[derive(Debug, Default)]
pub struct ErrorCollector {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an element whose processing returned an error
    pub fn record_failure(&self, index: usize, message: impl fmt::Display) {
        self.push(index, message.to_string(), ErrorKind::Failed);
    }

    /// Record an element whose processing panicked
    pub fn record_crash(&self, index: usize, panic_message: &str) {
        self.push(
            index,
            format!("panicked: {}", panic_message),
            ErrorKind::Crashed,
        );
    }

    fn push(&self, index: usize, message: String, kind: ErrorKind) {
        self.records.lock().push(ErrorRecord {
            index,
            message,
            kind,
        });
    }

    /// Drain the collector into an aggregated error, `None` if nothing failed
    pub fn finish(&self) -> Option<AggregatedError> {
        let mut records = std::mem::take(&mut *self.records.lock());
        if records.is_empty() {
            return None;
        }
        records.sort_by_key(|r| r.index);
        Some(AggregatedError { records })
    }
}
