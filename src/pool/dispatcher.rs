//! Dispatcher: one blocking pass over a processor's elements

use crate::core::{DispatchError, Processor, Result, WorkerId};
use crate::pool::config::{DispatchConfig, DispatchFlags, ExecutionMode, ExecutionPlan, Threshold};
use crate::pool::report::RunReport;
use crate::pool::worker::{
    process_element, ElementOutcome, HookGuard, RunContext, Worker, WorkerStats, WorkerSummary,
};
use crate::queue::{drain_signal, work_queue, WorkerState};
use chrono::Utc;
use log::{debug, error};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Processes every element of a [`Processor`] once, on the calling thread or
/// across a pool of worker threads.
///
/// The path is chosen per run from the element count, the worker cap and the
/// multithreading threshold; see [`DispatchConfig::plan`].
///
/// # Shutdown Mechanism
///
/// On the pool path the run loop enqueues every element followed by one stop
/// marker, waits for the worker that pulls the marker to acknowledge it, then
/// closes the queue and joins all workers. With [`DispatchFlags::ABORT_ON_ERROR`]
/// the first failure raises a shared flag that every worker checks before its
/// next dequeue.
///
/// # Example
///
/// ```rust
/// use rust_work_dispatch::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let sum = Arc::new(AtomicUsize::new(0));
/// let total = Arc::clone(&sum);
/// let processor = FnProcessor::new(1000, move |i| {
///     total.fetch_add(i, Ordering::Relaxed);
///     Ok(())
/// });
///
/// let dispatcher = Dispatcher::builder()
///     .processor(processor)
///     .worker_cap(4)
///     .build()?;
/// dispatcher.run()?;
///
/// assert_eq!(sum.load(Ordering::Relaxed), 999 * 1000 / 2);
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<P: Processor + 'static> {
    processor: Arc<P>,
    config: DispatchConfig,
}

impl<P: Processor + 'static> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("element_count", &self.processor.element_count())
            .finish()
    }
}

impl<P: Processor + 'static> Dispatcher<P> {
    /// Start building a dispatcher
    pub fn builder() -> DispatcherBuilder<P> {
        DispatcherBuilder::new()
    }

    /// Create a dispatcher, failing if no processor is supplied
    ///
    /// # Errors
    ///
    /// - `DispatchError::MissingProcessor` - `processor` is `None`
    /// - `DispatchError::InvalidConfig` - `config` failed validation
    pub fn try_new(processor: Option<Arc<P>>, config: DispatchConfig) -> Result<Self> {
        let processor = processor.ok_or(DispatchError::MissingProcessor)?;
        Self::with_config(processor, config)
    }

    /// Create a dispatcher with custom configuration
    pub fn with_config(processor: Arc<P>, config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { processor, config })
    }

    /// Create a dispatcher with default configuration
    pub fn new(processor: Arc<P>) -> Result<Self> {
        Self::with_config(processor, DispatchConfig::default())
    }

    /// The configuration this dispatcher was built with
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The processor
    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// Resolve the plan the next run would use for the processor's current element count
    pub fn plan(&self) -> ExecutionPlan {
        self.config.plan(self.processor.element_count())
    }

    /// Process every element, blocking until done.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Failed` - one or more elements failed or panicked
    /// - `DispatchError::SpawnError` - a worker thread could not be created
    /// - `DispatchError::JoinError` - a worker thread died outside the crash boundary
    pub fn run(&self) -> Result<()> {
        self.run_report()?.into_result()
    }

    /// Process every element and return the full [`RunReport`].
    ///
    /// Element failures are carried in the report rather than returned as `Err`.
    pub fn run_report(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let plan = self.plan();

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "dispatch_run",
            run_id = %run_id,
            elements = plan.element_count,
            mode = %plan.mode
        )
        .entered();

        debug!(
            "run {}: {} elements, {} path, {} worker(s), threshold {}",
            run_id, plan.element_count, plan.mode, plan.workers, plan.threshold
        );

        let ctx = Arc::new(RunContext::new(Arc::clone(&self.processor), self.config.flags));
        let workers = match plan.mode {
            ExecutionMode::Empty => Vec::new(),
            ExecutionMode::Single => vec![Self::run_single(&ctx, plan.element_count)],
            ExecutionMode::Pool => self.run_pool(run_id, &ctx, &plan)?,
        };

        let errors = ctx.errors.finish();
        let report = RunReport {
            run_id,
            started_at,
            elapsed: start.elapsed(),
            plan,
            workers,
            aborted: ctx.is_aborted(),
            errors,
        };

        debug!(
            "run {} finished in {:?}: processed={} failed={} crashed={}",
            run_id,
            report.elapsed,
            report.processed(),
            report.failed(),
            report.crashed()
        );

        Ok(report)
    }

    /// Process everything on the calling thread
    fn run_single(ctx: &RunContext<P>, element_count: usize) -> WorkerSummary {
        let worker = WorkerId::Caller;
        let stats = WorkerStats::new();

        {
            let state = stats.state_cell();
            let _hooks = HookGuard::init(&*ctx.processor, worker, state);

            for index in 0..element_count {
                let outcome = match ctx.lookup(index) {
                    Ok(payload) => process_element(ctx, worker, index, payload, &stats),
                    Err(fault) => {
                        stats.increment_crashed();
                        ctx.record_crash(worker, index, "lookup", &fault);
                        ElementOutcome::Crashed
                    }
                };

                if outcome != ElementOutcome::Completed && ctx.on_element_error(worker, index) {
                    state.transition(WorkerState::Aborting);
                    break;
                }
            }
            // No-op when the loop already aborted
            state.transition(WorkerState::Draining);
        }

        stats.summary(worker)
    }

    /// Fan elements out over `plan.workers` threads
    fn run_pool(
        &self,
        run_id: Uuid,
        ctx: &Arc<RunContext<P>>,
        plan: &ExecutionPlan,
    ) -> Result<Vec<WorkerSummary>> {
        let (mut sender, receiver) = work_queue(plan.element_count);
        let (notifier, waiter) = drain_signal();

        let mut workers = Vec::with_capacity(plan.workers);
        for id in 0..plan.workers {
            let name = format!("{}-{}", self.config.thread_name_prefix, id);
            match Worker::spawn(id, name, Arc::clone(ctx), receiver.clone(), notifier.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!("run {}: {}", run_id, e);
                    // Release the workers already running before reporting
                    ctx.abort();
                    sender.close();
                    Self::join_all(workers)?;
                    return Err(e);
                }
            }
        }
        // Workers own the only receivers and notifiers from here on
        drop(receiver);
        drop(notifier);

        for index in 0..plan.element_count {
            if ctx.is_aborted() {
                debug!("run {}: aborted, stopped enqueuing at element {}", run_id, index);
                break;
            }
            let payload = match ctx.lookup(index) {
                Ok(payload) => payload,
                Err(fault) => {
                    ctx.record_crash(WorkerId::Caller, index, "lookup", &fault);
                    // The abort check at the top of the loop ends enqueuing
                    ctx.on_element_error(WorkerId::Caller, index);
                    continue;
                }
            };
            if let Err(e) = sender.push(index, payload) {
                debug!("run {}: enqueue of element {} failed: {}", run_id, index, e);
                break;
            }
        }
        if let Err(e) = sender.push_stop() {
            debug!("run {}: stop marker not enqueued: {}", run_id, e);
        }

        let outcome = waiter.wait();
        debug!("run {}: drain finished ({:?}), closing queue", run_id, outcome);
        sender.close();

        Self::join_all(workers)
    }

    /// Join every worker, returning the first join error after all are joined
    fn join_all(workers: Vec<Worker>) -> Result<Vec<WorkerSummary>> {
        let mut summaries = Vec::with_capacity(workers.len());
        let mut first_error = None;

        for worker in workers {
            let id = WorkerId::Pool(worker.id());
            let stats = worker.stats();
            if let Err(e) = worker.join() {
                error!("{}", e);
                first_error.get_or_insert(e);
            }
            summaries.push(stats.summary(id));
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder<P: Processor + 'static> {
    processor: Option<Arc<P>>,
    config: DispatchConfig,
}

impl<P: Processor + 'static> Default for DispatcherBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Processor + 'static> std::fmt::Debug for DispatcherBuilder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("processor", &self.processor.as_ref().map(|_| "<processor>"))
            .field("config", &self.config)
            .finish()
    }
}

impl<P: Processor + 'static> DispatcherBuilder<P> {
    /// Create a builder with default configuration and no processor
    pub fn new() -> Self {
        Self {
            processor: None,
            config: DispatchConfig::default(),
        }
    }

    /// Set the processor
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn processor(self, processor: P) -> Self {
        self.shared_processor(Arc::new(processor))
    }

    /// Set a processor the caller keeps a handle to
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn shared_processor(mut self, processor: Arc<P>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Replace the whole configuration
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker cap (0 = automatic)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn worker_cap(mut self, cap: usize) -> Self {
        self.config.worker_cap = cap;
        self
    }

    /// Set the multithreading threshold; negative values derive it from the worker count
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn multithreaded_threshold(mut self, threshold: impl Into<Threshold>) -> Self {
        self.config.multithreaded_threshold = threshold.into();
        self
    }

    /// Replace all flags
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn flags(mut self, flags: DispatchFlags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Skip element lookup
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn skip_lookup(mut self) -> Self {
        self.config.flags |= DispatchFlags::SKIP_LOOKUP;
        self
    }

    /// Stop feeding elements after the first failure
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn abort_on_error(mut self) -> Self {
        self.config.flags |= DispatchFlags::ABORT_ON_ERROR;
        self
    }

    /// Set the host parallelism multiplier used when the cap is 0
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn auto_worker_multiplier(mut self, multiplier: usize) -> Self {
        self.config.auto_worker_multiplier = multiplier;
        self
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Build the dispatcher
    ///
    /// # Errors
    ///
    /// - `DispatchError::MissingProcessor` - no processor was set
    /// - `DispatchError::InvalidConfig` - configuration failed validation
    pub fn build(self) -> Result<Dispatcher<P>> {
        Dispatcher::try_new(self.processor, self.config)
    }
}
