//! Lifecycle state of a pool worker

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a worker is in the stop protocol.
///
/// `Idle -> Running -> Draining | Aborting -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    /// Spawned, init hook not yet run
    Idle = 0,
    /// Pulling and processing items
    Running = 1,
    /// Pulled the stop marker or found the queue closed
    Draining = 2,
    /// Saw the abort flag, or raised it
    Aborting = 3,
    /// Finish hook has run
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            3 => WorkerState::Aborting,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Draining)
                | (Running, Aborting)
                | (Draining, Stopped)
                | (Aborting, Stopped)
        )
    }

    /// Whether the worker has stopped pulling items
    pub fn is_terminal(self) -> bool {
        self == WorkerState::Stopped
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Aborting => "aborting",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Atomically readable [`WorkerState`], shared between a worker and its owner
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    /// Start in [`WorkerState::Idle`]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Idle as u8),
        }
    }

    /// Current state
    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next`, returning `false` (and leaving the state alone) if the
    /// transition is not legal from the current state
    pub fn transition(&self, next: WorkerState) -> bool {
        let current = self.get();
        if !current.can_transition_to(next) {
            return false;
        }
        self.state
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
