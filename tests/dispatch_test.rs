//! End-to-end dispatch scenarios

use rust_work_dispatch::prelude::*;
use rust_work_dispatch::queue::WorkerState;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Negates every element in place and counts lifecycle hooks
struct Negator {
    data: Vec<AtomicI64>,
    single_thread: AtomicI32,
    started: AtomicI32,
    finished: AtomicI32,
    counter: AtomicI32,
}

impl Negator {
    fn new(n: usize) -> Self {
        Self {
            data: (0..n as i64).map(AtomicI64::new).collect(),
            single_thread: AtomicI32::new(0),
            started: AtomicI32::new(0),
            finished: AtomicI32::new(0),
            counter: AtomicI32::new(0),
        }
    }
}

impl Processor for Negator {
    type Payload = i64;

    fn element_count(&self) -> usize {
        self.data.len()
    }

    fn get_element(&self, index: usize) -> i64 {
        self.data[index].load(Ordering::Relaxed)
    }

    fn worker_init(&self, worker: WorkerId) {
        if worker.raw() < 0 {
            self.single_thread.fetch_add(1, Ordering::SeqCst);
        }
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn worker_finish(&self, _worker: WorkerId) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn process(&self, index: usize, payload: Option<i64>) -> Result<()> {
        let value = payload.ok_or_else(|| DispatchError::element("lookup was skipped"))?;
        self.data[index].store(-value, Ordering::Relaxed);
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn check(name: &str, n: usize, worker_cap: usize, threshold: usize) {
    let negator = Arc::new(Negator::new(n));
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&negator))
        .worker_cap(worker_cap)
        .multithreaded_threshold(threshold)
        .build()
        .expect("Failed to build dispatcher");

    dispatcher
        .run()
        .unwrap_or_else(|e| panic!("{}: {}", name, e));

    for (i, value) in negator.data.iter().enumerate() {
        assert_eq!(value.load(Ordering::Relaxed), -(i as i64), "{}: element {}", name, i);
    }
    assert_eq!(negator.counter.load(Ordering::SeqCst) as usize, n, "{}", name);

    let single = worker_cap == 1 || threshold > n;
    let expected_single = if n == 0 {
        0
    } else if single || n == 1 {
        1
    } else {
        0
    };
    let expected_threads = if n == 0 {
        0
    } else if single {
        1
    } else {
        worker_cap.min(n)
    };

    assert_eq!(
        negator.single_thread.load(Ordering::SeqCst),
        expected_single,
        "{}: single thread count",
        name
    );
    assert_eq!(
        negator.started.load(Ordering::SeqCst) as usize,
        expected_threads,
        "{}: started workers",
        name
    );
    assert_eq!(
        negator.finished.load(Ordering::SeqCst) as usize,
        expected_threads,
        "{}: finished workers",
        name
    );
}

fn check_matrix(n: usize) {
    init_logger();

    check("single 1", n, 1, 0);
    check("single 2", n, 1, n);
    check("single 3", n, 1, n + 1);

    check("pool 1.1", n, 5, 0);
    check("pool 1.2", n, 5, n);
    check("pool 1.3", n, 5, n + 1);

    check("pool 2.1", n, 100, 0);
    check("pool 2.2", n, 100, n);
    check("pool 2.3", n, 100, n + 1);

    if n > 0 && n < 500 {
        check("pool 3.1", n, n, 0);
        check("pool 3.2", n, n, n);
        check("pool 3.3", n, n, n + 1);
    }
}

#[test]
fn test_matrix_zero() {
    check_matrix(0);
}

#[test]
fn test_matrix_one() {
    check_matrix(1);
}

#[test]
fn test_matrix_small() {
    check_matrix(10);
}

#[test]
fn test_matrix_big() {
    check_matrix(1_000_000);
}

#[test]
fn test_missing_processor() {
    let result = Dispatcher::<Negator>::try_new(None, DispatchConfig::default());
    assert!(matches!(result, Err(DispatchError::MissingProcessor)));
}

#[test]
fn test_million_negations_hundred_workers() {
    init_logger();
    let negator = Arc::new(Negator::new(1_000_000));
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&negator))
        .worker_cap(100)
        .multithreaded_threshold(0usize)
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    assert!(report.is_success());
    assert_eq!(report.plan.workers, 100);
    assert_eq!(report.processed(), 1_000_000);
    assert_eq!(negator.started.load(Ordering::SeqCst), 100);
    assert_eq!(negator.finished.load(Ordering::SeqCst), 100);
    assert_eq!(negator.single_thread.load(Ordering::SeqCst), 0);
    assert_eq!(negator.data[999_999].load(Ordering::Relaxed), -999_999);
}

#[test]
fn test_one_element_clamps_to_single() {
    let negator = Arc::new(Negator::new(1));
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&negator))
        .worker_cap(5)
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    assert_eq!(report.plan.mode, ExecutionMode::Single);
    assert_eq!(report.workers[0].id, WorkerId::Caller);
    assert_eq!(negator.started.load(Ordering::SeqCst), 1);
    assert_eq!(negator.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_every_failure_collected_without_abort() {
    init_logger();
    let processor = FnProcessor::new(1000, |i| {
        if i % 10 == 0 {
            Err(DispatchError::element(format!("multiple of ten: {}", i)))
        } else {
            Ok(())
        }
    });
    let dispatcher = Dispatcher::builder()
        .processor(processor)
        .worker_cap(8)
        .build()
        .unwrap();

    let err = dispatcher.run().unwrap_err();
    let aggregated = err.as_aggregated().expect("aggregated error");
    assert_eq!(aggregated.len(), 100);
    assert_eq!(
        aggregated.indices().collect::<Vec<_>>(),
        (0..1000).step_by(10).collect::<Vec<_>>()
    );
    assert_eq!(aggregated.records()[3].message, "multiple of ten: 30");
    assert!(err.to_string().starts_with("100 element(s) failed: [0] multiple of ten: 0; [10]"));
}

#[test]
fn test_pool_abort_on_first_error() {
    init_logger();
    let attempted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempted);
    let processor = FnProcessor::new(10_000, move |i| {
        counter.fetch_add(1, Ordering::SeqCst);
        if i == 3 {
            Err(DispatchError::element("deterministic failure"))
        } else {
            std::thread::sleep(std::time::Duration::from_micros(50));
            Ok(())
        }
    });
    let dispatcher = Dispatcher::builder()
        .processor(processor)
        .worker_cap(4)
        .abort_on_error()
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    assert!(report.aborted);
    assert!(report.attempted() <= 10_000);
    assert!(report.attempted() < 10_000, "abort did not stop the run early");
    assert_eq!(report.attempted() as usize, attempted.load(Ordering::SeqCst));
    assert!(report
        .workers
        .iter()
        .all(|w| w.final_state == WorkerState::Stopped));

    let errors = report.errors.expect("failure recorded");
    assert!(errors.contains_index(3));
}

#[test]
fn test_pool_crash_does_not_stop_siblings() {
    init_logger();
    let processor = Arc::new(Negator::new(400));
    struct Crashy(Arc<Negator>);
    impl Processor for Crashy {
        type Payload = i64;
        fn element_count(&self) -> usize {
            self.0.element_count()
        }
        fn get_element(&self, index: usize) -> i64 {
            self.0.get_element(index)
        }
        fn worker_init(&self, worker: WorkerId) {
            self.0.worker_init(worker)
        }
        fn worker_finish(&self, worker: WorkerId) {
            self.0.worker_finish(worker)
        }
        fn process(&self, index: usize, payload: Option<i64>) -> Result<()> {
            if index == 5 {
                panic!("element five is cursed");
            }
            self.0.process(index, payload)
        }
    }

    let dispatcher = Dispatcher::builder()
        .processor(Crashy(Arc::clone(&processor)))
        .worker_cap(4)
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    assert!(!report.aborted);
    assert_eq!(report.crashed(), 1);
    assert_eq!(report.processed(), 399);
    assert_eq!(processor.started.load(Ordering::SeqCst), 4);
    assert_eq!(processor.finished.load(Ordering::SeqCst), 4);

    let errors = report.into_result().unwrap_err();
    let aggregated = errors.as_aggregated().unwrap();
    assert_eq!(aggregated.crashed(), 1);
    assert_eq!(aggregated.records()[0].index, 5);
    assert_eq!(aggregated.records()[0].kind, ErrorKind::Crashed);
}

#[test]
fn test_every_element_panicking_is_reported() {
    init_logger();
    let finishes = Arc::new(AtomicUsize::new(0));

    struct AlwaysPanics(Arc<AtomicUsize>);
    impl Processor for AlwaysPanics {
        type Payload = ();
        fn element_count(&self) -> usize {
            100
        }
        fn get_element(&self, _index: usize) {}
        fn worker_finish(&self, _worker: WorkerId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn process(&self, index: usize, _payload: Option<()>) -> Result<()> {
            panic!("cannot handle {}", index);
        }
    }

    let dispatcher = Dispatcher::builder()
        .processor(AlwaysPanics(Arc::clone(&finishes)))
        .worker_cap(4)
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    assert_eq!(report.crashed(), 100);
    assert_eq!(report.processed(), 0);
    assert_eq!(finishes.load(Ordering::SeqCst), 4);
    assert!(report
        .workers
        .iter()
        .all(|w| w.final_state == WorkerState::Stopped));

    let errors = report.errors.unwrap();
    assert_eq!(errors.len(), 100);
    assert_eq!(errors.crashed(), 100);
}

/// Processor whose hooks, lookup and processing can be made to panic
struct Faulty {
    hits: Vec<AtomicUsize>,
    inits: AtomicUsize,
    finishes: AtomicUsize,
    panic_in_init: bool,
    panic_in_finish: bool,
    lookup_panics_at: Option<usize>,
    process_panics_at: Vec<usize>,
}

impl Faulty {
    fn new(n: usize) -> Self {
        Self {
            hits: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            inits: AtomicUsize::new(0),
            finishes: AtomicUsize::new(0),
            panic_in_init: false,
            panic_in_finish: false,
            lookup_panics_at: None,
            process_panics_at: Vec::new(),
        }
    }

    fn total_hits(&self) -> usize {
        self.hits.iter().map(|h| h.load(Ordering::SeqCst)).sum()
    }

    fn hit_once_except(&self, skipped: &[usize]) -> bool {
        self.hits.iter().enumerate().all(|(i, h)| {
            let expected = if skipped.contains(&i) { 0 } else { 1 };
            h.load(Ordering::SeqCst) == expected
        })
    }
}

impl Processor for Faulty {
    type Payload = usize;

    fn element_count(&self) -> usize {
        self.hits.len()
    }

    fn get_element(&self, index: usize) -> usize {
        if self.lookup_panics_at == Some(index) {
            panic!("no element at {}", index);
        }
        index
    }

    fn worker_init(&self, _worker: WorkerId) {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.panic_in_init {
            panic!("init failed");
        }
    }

    fn worker_finish(&self, _worker: WorkerId) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        if self.panic_in_finish {
            panic!("finish failed");
        }
    }

    fn process(&self, index: usize, _payload: Option<usize>) -> Result<()> {
        if self.process_panics_at.contains(&index) {
            panic!("element {} blew up", index);
        }
        self.hits[index].fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn run_faulty(faulty: Faulty, worker_cap: usize, abort: bool) -> (Arc<Faulty>, RunReport) {
    let faulty = Arc::new(faulty);
    let mut builder = Dispatcher::builder()
        .shared_processor(Arc::clone(&faulty))
        .worker_cap(worker_cap);
    if abort {
        builder = builder.abort_on_error();
    }
    let report = builder.build().unwrap().run_report().unwrap();
    (faulty, report)
}

#[test]
fn test_single_path_continues_after_panic() {
    init_logger();
    let mut faulty = Faulty::new(5);
    faulty.process_panics_at = vec![2];

    let (faulty, report) = run_faulty(faulty, 1, false);
    assert!(faulty.hit_once_except(&[2]));
    assert_eq!(faulty.total_hits(), 4);
    assert_eq!(report.errors.unwrap().indices().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn test_pool_continues_after_every_worker_panics() {
    init_logger();
    let mut faulty = Faulty::new(100);
    faulty.process_panics_at = vec![0, 1];

    let (faulty, report) = run_faulty(faulty, 2, false);
    assert_eq!(faulty.total_hits(), 98);
    assert!(faulty.hit_once_except(&[0, 1]));
    assert_eq!(report.processed(), 98);
    assert_eq!(report.errors.unwrap().indices().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_panic_with_abort_stops_single_path() {
    init_logger();
    let mut faulty = Faulty::new(50);
    faulty.process_panics_at = vec![7];

    let (faulty, report) = run_faulty(faulty, 1, true);
    assert!(report.aborted);
    assert_eq!(faulty.total_hits(), 7);
    assert_eq!(faulty.finishes.load(Ordering::SeqCst), 1);
    assert!(report.errors.unwrap().contains_index(7));
}

#[test]
fn test_init_panic_single_path_still_processes() {
    init_logger();
    let mut faulty = Faulty::new(10);
    faulty.panic_in_init = true;

    let (faulty, report) = run_faulty(faulty, 1, false);
    assert!(faulty.hit_once_except(&[]));
    assert_eq!(faulty.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(report.processed(), 10);
    assert!(report.is_success());
}

#[test]
fn test_init_panic_pool_still_processes() {
    init_logger();
    let mut faulty = Faulty::new(1000);
    faulty.panic_in_init = true;

    let (faulty, report) = run_faulty(faulty, 4, false);
    assert!(faulty.hit_once_except(&[]));
    assert_eq!(faulty.inits.load(Ordering::SeqCst), 4);
    assert_eq!(faulty.finishes.load(Ordering::SeqCst), 4);
    assert_eq!(report.processed(), 1000);
    assert!(report.is_success());
}

#[test]
fn test_finish_panic_is_logged_only() {
    init_logger();
    let mut faulty = Faulty::new(200);
    faulty.panic_in_finish = true;

    let (faulty, report) = run_faulty(faulty, 4, false);
    assert!(faulty.hit_once_except(&[]));
    assert_eq!(faulty.finishes.load(Ordering::SeqCst), 4);
    assert!(report.is_success());
    assert!(report
        .workers
        .iter()
        .all(|w| w.final_state == WorkerState::Stopped));
}

#[test]
fn test_lookup_panic_single_path_skips_that_index() {
    init_logger();
    let mut faulty = Faulty::new(10);
    faulty.lookup_panics_at = Some(3);

    let (faulty, report) = run_faulty(faulty, 1, false);
    assert!(faulty.hit_once_except(&[3]));
    assert_eq!(report.crashed(), 1);

    let errors = report.errors.unwrap();
    assert_eq!(errors.indices().collect::<Vec<_>>(), vec![3]);
    assert_eq!(errors.records()[0].kind, ErrorKind::Crashed);
    assert_eq!(errors.records()[0].message, "panicked: no element at 3");
}

#[test]
fn test_lookup_panic_pool_skips_that_index() {
    init_logger();
    let mut faulty = Faulty::new(200);
    faulty.lookup_panics_at = Some(150);

    let (faulty, report) = run_faulty(faulty, 4, false);
    assert!(faulty.hit_once_except(&[150]));
    assert_eq!(report.processed(), 199);

    let errors = report.errors.unwrap();
    assert_eq!(errors.indices().collect::<Vec<_>>(), vec![150]);
    assert_eq!(errors.crashed(), 1);
}

#[test]
fn test_lookup_panic_with_abort_stops_enqueuing() {
    init_logger();
    let mut faulty = Faulty::new(10);
    faulty.lookup_panics_at = Some(3);

    let (faulty, report) = run_faulty(faulty, 1, true);
    assert!(report.aborted);
    assert_eq!(faulty.total_hits(), 3);
    assert!(report.errors.unwrap().contains_index(3));
}

#[test]
fn test_auto_threshold_keeps_small_runs_single() {
    let negator = Arc::new(Negator::new(100));
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&negator))
        .worker_cap(4)
        .multithreaded_threshold(-1isize)
        .build()
        .unwrap();

    // 4 workers * 50 = 200 > 100
    assert_eq!(dispatcher.plan().mode, ExecutionMode::Single);
    dispatcher.run().unwrap();
    assert_eq!(negator.single_thread.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatcher_can_run_twice() {
    let negator = Arc::new(Negator::new(300));
    let dispatcher = Dispatcher::builder()
        .shared_processor(Arc::clone(&negator))
        .worker_cap(3)
        .build()
        .unwrap();

    dispatcher.run().unwrap();
    dispatcher.run().unwrap();

    // Negated twice
    assert_eq!(negator.data[17].load(Ordering::Relaxed), 17);
    assert_eq!(negator.started.load(Ordering::SeqCst), 6);
}

#[test]
fn test_config_loads_from_json() {
    let config: DispatchConfig = serde_json::from_str(
        r#"{
            "worker_cap": 3,
            "multithreaded_threshold": 10,
            "not_an_option": true
        }"#,
    )
    .expect("config should parse");

    assert_eq!(config.worker_cap, 3);
    assert_eq!(config.multithreaded_threshold, Threshold::Elements(10));
    assert_eq!(config.auto_worker_multiplier, 1);
    assert!(config.flags.is_empty());

    // Signed threshold: any negative value derives it from the worker count
    let config: DispatchConfig =
        serde_json::from_str(r#"{ "multithreaded_threshold": -1 }"#).unwrap();
    assert_eq!(config.multithreaded_threshold, Threshold::Auto);

    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["multithreaded_threshold"], -1);
}

#[test]
fn test_report_serializes() {
    let processor = FnProcessor::new(60, |i| {
        if i == 59 {
            Err(DispatchError::element("last"))
        } else {
            Ok(())
        }
    });
    let dispatcher = Dispatcher::builder()
        .processor(processor)
        .worker_cap(2)
        .build()
        .unwrap();

    let report = dispatcher.run_report().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["plan"]["mode"], "pool");
    assert_eq!(json["workers"].as_array().unwrap().len(), 2);
    assert_eq!(json["errors"]["records"][0]["index"], 59);
    assert_eq!(json["errors"]["records"][0]["kind"], "failed");
}
