//! Work distribution for the pool path.
//!
//! The run loop pushes one [`WorkItem::Element`] per index followed by a single
//! [`WorkItem::Stop`] into a channel sized to hold all of them, so pushing never
//! blocks. The worker that pulls the stop marker posts a drain notification;
//! the run loop waits for it and then closes the queue, which releases every
//! worker still blocked on a dequeue.
//!
//! ```text
//!  run loop                          workers
//!  ────────                          ───────
//!  push Element(0..N)  ──queue──▶    recv → process → recv ...
//!  push Stop           ──queue──▶    recv Stop → notify ─┐
//!  wait  ◀──────────────────────── drain notification ◀──┘
//!  close queue         ─────────▶    recv → Closed → exit
//!  join all workers
//! ```

mod channel;
mod state;

pub use channel::{drain_signal, work_queue, DrainNotifier, DrainOutcome, DrainWaiter, WorkReceiver, WorkSender};
pub use state::{StateCell, WorkerState};

/// An item pulled by a pool worker
#[derive(Debug)]
pub enum WorkItem<T> {
    /// A real element to process
    Element {
        /// Element index in `[0, N)`
        index: usize,
        /// Looked-up payload, `None` when lookup is skipped
        payload: Option<T>,
    },
    /// End of the index range
    Stop,
}

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed and fully drained
    Closed,
    /// More items were pushed than the queue was sized for
    Full,
    /// Every worker has gone away, nobody can receive the item
    NoReceivers,
    /// The stop marker was already pushed for this run
    StopAlreadySent,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Closed => write!(f, "queue is closed"),
            QueueError::Full => write!(f, "queue is full"),
            QueueError::NoReceivers => write!(f, "queue has no receivers"),
            QueueError::StopAlreadySent => write!(f, "stop marker already sent"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Result type for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;
