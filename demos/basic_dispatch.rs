//! Basic dispatch example
//!
//! Demonstrates path selection, error aggregation, and run reports.
//!
//! Run with: cargo run --example basic_dispatch

use rust_work_dispatch::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sums squares of the element indices, rejecting multiples of 97
struct SquareSum {
    count: usize,
    total: AtomicU64,
}

impl Processor for SquareSum {
    type Payload = u64;

    fn element_count(&self) -> usize {
        self.count
    }

    fn get_element(&self, index: usize) -> u64 {
        index as u64
    }

    fn worker_init(&self, worker: WorkerId) {
        println!("  Worker {} starting on {:?}", worker, thread::current().name());
    }

    fn worker_finish(&self, worker: WorkerId) {
        println!("  Worker {} finished", worker);
    }

    fn process(&self, index: usize, payload: Option<u64>) -> Result<()> {
        if index > 0 && index % 97 == 0 {
            return Err(DispatchError::element(format!("{} is rejected", index)));
        }
        let value = payload.unwrap_or(index as u64);
        thread::sleep(Duration::from_micros(20));
        self.total.fetch_add(value * value, Ordering::Relaxed);
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Rust Work Dispatch - Basic Example ===\n");

    println!("1. Small collection stays on the calling thread:");
    let small = Dispatcher::builder()
        .processor(FnProcessor::new(10, |_| Ok(())))
        .worker_cap(4)
        .multithreaded_threshold(-1isize)
        .build()?;
    println!("   Plan: {:?}", small.plan());
    small.run()?;

    println!("\n2. Large collection fans out to a pool:");
    let squares = Arc::new(SquareSum {
        count: 1_000,
        total: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&squares))
        .worker_cap(4)
        .thread_name_prefix("squares")
        .build()?;

    let report = dispatcher.run_report()?;

    println!("\n3. Report {}:", report.run_id);
    println!("   Mode: {}, workers: {}", report.plan.mode, report.plan.workers);
    println!("   Elapsed: {:?}", report.elapsed);
    println!(
        "   Processed: {}, failed: {}, crashed: {}",
        report.processed(),
        report.failed(),
        report.crashed()
    );
    for worker in &report.workers {
        println!(
            "   Worker {}: {} processed, {} failed, {}μs, {}",
            worker.id, worker.processed, worker.failed, worker.processing_time_us, worker.final_state
        );
    }
    println!("   Sum of accepted squares: {}", squares.total.load(Ordering::Relaxed));

    println!("\n4. Aggregated error:");
    match report.into_result() {
        Ok(()) => println!("   No failures"),
        Err(e) => println!("   {}", e),
    }

    println!("\n5. Abort on first error:");
    let aborting = Dispatcher::builder()
        .shared_processor(Arc::new(SquareSum {
            count: 1_000,
            total: AtomicU64::new(0),
        }))
        .worker_cap(4)
        .abort_on_error()
        .build()?;
    let report = aborting.run_report()?;
    println!(
        "   Aborted: {}, attempted {} of 1000",
        report.aborted,
        report.attempted()
    );

    println!("\n=== Example completed successfully ===");
    Ok(())
}
