//! Work queue and drain notification built on crossbeam channels.

use super::{QueueError, QueueResult, WorkItem};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

/// Create a work queue able to hold `elements` items plus the stop marker.
///
/// # Example
///
/// ```rust
/// use rust_work_dispatch::queue::{work_queue, WorkItem};
///
/// let (mut sender, receiver) = work_queue::<u32>(2);
/// sender.push(0, Some(10)).unwrap();
/// sender.push(1, None).unwrap();
/// sender.push_stop().unwrap();
///
/// assert!(matches!(receiver.recv(), Ok(WorkItem::Element { index: 0, payload: Some(10) })));
/// ```
pub fn work_queue<T>(elements: usize) -> (WorkSender<T>, WorkReceiver<T>) {
    let capacity = elements.saturating_add(1);
    let (sender, receiver) = channel::bounded(capacity);
    (
        WorkSender {
            sender: Some(sender),
            stop_sent: false,
        },
        WorkReceiver { receiver },
    )
}

/// Producer half, owned by the run loop
#[derive(Debug)]
pub struct WorkSender<T> {
    sender: Option<Sender<WorkItem<T>>>,
    stop_sent: bool,
}

impl<T> WorkSender<T> {
    /// Enqueue the element at `index`
    pub fn push(&self, index: usize, payload: Option<T>) -> QueueResult<()> {
        self.send(WorkItem::Element { index, payload })
    }

    /// Enqueue the stop marker. Only one marker is accepted per queue.
    pub fn push_stop(&mut self) -> QueueResult<()> {
        if self.stop_sent {
            return Err(QueueError::StopAlreadySent);
        }
        self.send(WorkItem::Stop)?;
        self.stop_sent = true;
        Ok(())
    }

    fn send(&self, item: WorkItem<T>) -> QueueResult<()> {
        let sender = self.sender.as_ref().ok_or(QueueError::Closed)?;
        // Sized for every item of the run; Full means more pushes than elements
        sender.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::NoReceivers,
        })
    }

    /// Close the queue. Items already queued can still be received.
    pub fn close(&mut self) {
        self.sender = None;
    }
}

/// Consumer half, cloned into every worker
#[derive(Debug)]
pub struct WorkReceiver<T> {
    receiver: Receiver<WorkItem<T>>,
}

impl<T> Clone for WorkReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> WorkReceiver<T> {
    /// Block until an item is available or the queue is closed and empty
    pub fn recv(&self) -> QueueResult<WorkItem<T>> {
        self.receiver.recv().map_err(|_| QueueError::Closed)
    }
}

/// Create the single-slot drain notification
pub fn drain_signal() -> (DrainNotifier, DrainWaiter) {
    let (sender, receiver) = channel::bounded(1);
    (DrainNotifier { sender }, DrainWaiter { receiver })
}

/// Posting half, one clone per worker
#[derive(Debug, Clone)]
pub struct DrainNotifier {
    sender: Sender<()>,
}

impl DrainNotifier {
    /// Post the notification. Returns `false` if it was already posted.
    pub fn notify(&self) -> bool {
        self.sender.try_send(()).is_ok()
    }
}

/// How the run loop's wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A worker posted the notification
    Acknowledged,
    /// Every notifier was dropped first, i.e. all workers have exited
    AllWorkersExited,
}

/// Waiting half, owned by the run loop
#[derive(Debug)]
pub struct DrainWaiter {
    receiver: Receiver<()>,
}

impl DrainWaiter {
    /// Block until a notification arrives or every worker is gone
    pub fn wait(self) -> DrainOutcome {
        match self.receiver.recv() {
            Ok(()) => DrainOutcome::Acknowledged,
            Err(_) => DrainOutcome::AllWorkersExited,
        }
    }
}
