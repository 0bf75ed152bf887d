//! Worker thread implementation

use crate::core::crash::{self, CrashFault};
use crate::core::{DispatchError, ErrorCollector, Processor, Result, WorkerId};
use crate::pool::config::DispatchFlags;
use crate::queue::{DrainNotifier, StateCell, WorkItem, WorkReceiver, WorkerState};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Statistics for a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Elements processed successfully
    pub elements_processed: AtomicU64,
    /// Elements whose processing returned an error
    pub elements_failed: AtomicU64,
    /// Elements whose processing panicked
    pub elements_crashed: AtomicU64,
    /// Total time spent inside `Processor::process` (microseconds)
    pub total_processing_time_us: AtomicU64,
    state: StateCell,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment processed counter
    pub fn increment_processed(&self) {
        self.elements_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed counter
    pub fn increment_failed(&self) {
        self.elements_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment crashed counter
    pub fn increment_crashed(&self) {
        self.elements_crashed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_processing_time_us
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Get elements processed
    pub fn get_processed(&self) -> u64 {
        self.elements_processed.load(Ordering::Relaxed)
    }

    /// Get elements failed
    pub fn get_failed(&self) -> u64 {
        self.elements_failed.load(Ordering::Relaxed)
    }

    /// Get elements crashed
    pub fn get_crashed(&self) -> u64 {
        self.elements_crashed.load(Ordering::Relaxed)
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    /// Snapshot for a run report
    pub fn summary(&self, id: WorkerId) -> WorkerSummary {
        WorkerSummary {
            id,
            processed: self.get_processed(),
            failed: self.get_failed(),
            crashed: self.get_crashed(),
            processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
            final_state: self.state(),
        }
    }
}

/// Point-in-time copy of a worker's statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    /// Worker identifier
    pub id: WorkerId,
    /// Elements processed successfully
    pub processed: u64,
    /// Elements that returned an error
    pub failed: u64,
    /// Elements that panicked
    pub crashed: u64,
    /// Time spent in `process` (microseconds)
    pub processing_time_us: u64,
    /// State when the summary was taken
    pub final_state: WorkerState,
}

/// State shared by every worker of one run
pub(crate) struct RunContext<P: Processor> {
    pub(crate) processor: Arc<P>,
    pub(crate) errors: ErrorCollector,
    flags: DispatchFlags,
    aborted: AtomicBool,
}

impl<P: Processor> RunContext<P> {
    pub(crate) fn new(processor: Arc<P>, flags: DispatchFlags) -> Self {
        Self {
            processor,
            errors: ErrorCollector::new(),
            flags,
            aborted: AtomicBool::new(false),
        }
    }

    pub(crate) fn abort_on_error(&self) -> bool {
        self.flags.contains(DispatchFlags::ABORT_ON_ERROR)
    }

    /// Raise the abort flag. Returns `true` for the caller that raised it first.
    pub(crate) fn abort(&self) -> bool {
        !self.aborted.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// React to a failed or crashed element. Returns `true` when the caller
    /// must stop taking elements.
    pub(crate) fn on_element_error(&self, worker: WorkerId, index: usize) -> bool {
        if !self.abort_on_error() {
            return false;
        }
        if self.abort() {
            warn!("worker {}: element {} failed, aborting run", worker, index);
        }
        true
    }

    /// Look up the payload for `index` unless lookup is skipped
    pub(crate) fn lookup(
        &self,
        index: usize,
    ) -> std::result::Result<Option<P::Payload>, CrashFault> {
        if self.flags.contains(DispatchFlags::SKIP_LOOKUP) {
            return Ok(None);
        }
        crash::isolate(|| Some(self.processor.get_element(index)))
    }

    /// Log and record a panic caught while handling `index`
    pub(crate) fn record_crash(&self, worker: WorkerId, index: usize, stage: &str, fault: &CrashFault) {
        error!(
            "worker {} panicked during {} of element {}: {}\n{}",
            worker, stage, index, fault.message, fault.backtrace
        );
        self.errors.record_crash(index, &fault.message);
    }
}

/// What happened to one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementOutcome {
    Completed,
    Failed,
    Crashed,
}

/// Process one element under the crash boundary, recording any failure
pub(crate) fn process_element<P: Processor>(
    ctx: &RunContext<P>,
    worker: WorkerId,
    index: usize,
    payload: Option<P::Payload>,
    stats: &WorkerStats,
) -> ElementOutcome {
    let start = Instant::now();
    let result = crash::isolate(|| ctx.processor.process(index, payload));
    stats.add_processing_time(start.elapsed());

    match result {
        Ok(Ok(())) => {
            stats.increment_processed();
            ElementOutcome::Completed
        }
        Ok(Err(e)) => {
            debug!("worker {}: element {} failed: {}", worker, index, e);
            stats.increment_failed();
            ctx.errors.record_failure(index, &e);
            ElementOutcome::Failed
        }
        Err(fault) => {
            stats.increment_crashed();
            ctx.record_crash(worker, index, "processing", &fault);
            ElementOutcome::Crashed
        }
    }
}

/// Runs the worker's init hook on creation and its finish hook on drop.
///
/// Both hooks are isolated; a panic in either is logged and swallowed. A worker
/// whose init hook panicked still takes its share of elements, so any fallout
/// shows up as per-element failures.
pub(crate) struct HookGuard<'a, P: Processor> {
    processor: &'a P,
    worker: WorkerId,
    state: &'a StateCell,
}

impl<'a, P: Processor> HookGuard<'a, P> {
    /// Run `worker_init` and move the worker to `Running`
    pub(crate) fn init(processor: &'a P, worker: WorkerId, state: &'a StateCell) -> Self {
        let guard = Self {
            processor,
            worker,
            state,
        };
        if let Err(fault) = crash::isolate(|| processor.worker_init(worker)) {
            error!(
                "worker {} panicked in init hook: {}\n{}",
                worker, fault.message, fault.backtrace
            );
        }
        state.transition(WorkerState::Running);
        guard
    }
}

impl<P: Processor> Drop for HookGuard<'_, P> {
    fn drop(&mut self) {
        // Unwound without choosing a way out: count it as an abort
        if self.state.get() == WorkerState::Running {
            self.state.transition(WorkerState::Aborting);
        }
        if let Err(fault) = crash::isolate(|| self.processor.worker_finish(self.worker)) {
            error!(
                "worker {} panicked in finish hook: {}\n{}",
                self.worker, fault.message, fault.backtrace
            );
        }
        self.state.transition(WorkerState::Stopped);
    }
}

/// A pool worker thread pulling elements from the run's queue
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a worker.
    ///
    /// The worker exits after it pulls the stop marker, finds the queue closed,
    /// or observes the abort flag. A panicking element is recorded and the
    /// worker moves on to the next one.
    pub(crate) fn spawn<P>(
        id: usize,
        thread_name: String,
        ctx: Arc<RunContext<P>>,
        receiver: WorkReceiver<P::Payload>,
        notifier: DrainNotifier,
    ) -> Result<Self>
    where
        P: Processor + 'static,
    {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                Self::run(id, &ctx, &receiver, &notifier, &stats_clone);
            })
            .map_err(|e| DispatchError::spawn_with_source(id, "Cannot create thread", e))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| DispatchError::join(self.id, "Worker panicked"))?;
        }
        Ok(())
    }

    /// Main worker loop
    fn run<P: Processor>(
        id: usize,
        ctx: &RunContext<P>,
        receiver: &WorkReceiver<P::Payload>,
        notifier: &DrainNotifier,
        stats: &WorkerStats,
    ) {
        let worker = WorkerId::Pool(id);

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("dispatch_worker", id = id).entered();

        let state = stats.state_cell();
        let _hooks = HookGuard::init(&*ctx.processor, worker, state);
        debug!("worker {} started", worker);

        loop {
            if ctx.is_aborted() {
                state.transition(WorkerState::Aborting);
                break;
            }

            match receiver.recv() {
                Ok(WorkItem::Element { index, payload }) => {
                    let outcome = process_element(ctx, worker, index, payload, stats);
                    if outcome != ElementOutcome::Completed && ctx.on_element_error(worker, index)
                    {
                        notifier.notify();
                        state.transition(WorkerState::Aborting);
                        break;
                    }
                }
                Ok(WorkItem::Stop) => {
                    state.transition(WorkerState::Draining);
                    notifier.notify();
                    break;
                }
                Err(_) => {
                    // Queue closed after another worker drained it
                    state.transition(WorkerState::Draining);
                    break;
                }
            }
        }

        debug!(
            "worker {} shutting down: processed={} failed={} crashed={}",
            worker,
            stats.get_processed(),
            stats.get_failed(),
            stats.get_crashed()
        );
    }
}
