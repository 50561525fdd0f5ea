use std::sync::Arc;
use std::time::Duration;

use stresstest::engine::{classify, Accumulator, FailureKind, Outcome, TransportErrorKind};

#[test]
fn test_classify_success_boundary() {
    assert_eq!(classify(200), None);
    assert_eq!(classify(201), None);
    assert_eq!(classify(299), None);
    assert_eq!(classify(199), Some(FailureKind::Status(199)));
    assert_eq!(classify(300), Some(FailureKind::Status(300)));
    assert_eq!(classify(404), Some(FailureKind::Status(404)));
    assert_eq!(classify(500), Some(FailureKind::Status(500)));
}

#[test]
fn test_new_accumulator_starts_empty() {
    let acc = Accumulator::new("http://example.com", 50);
    assert_eq!(acc.target(), "http://example.com");
    assert_eq!(acc.total_requested(), 50);

    let counters = acc.snapshot();
    assert_eq!(counters.executed, 0);
    assert_eq!(counters.success, 0);
    assert!(counters.failures.is_empty());
}

#[test]
fn test_record_classifies_each_outcome() {
    let acc = Accumulator::new("http://example.com", 6);
    acc.record(Outcome::Status(200));
    acc.record(Outcome::Status(204));
    acc.record(Outcome::Status(404));
    acc.record(Outcome::Status(404));
    acc.record(Outcome::Transport(TransportErrorKind::Connect));
    acc.record(Outcome::Aborted);

    let counters = acc.snapshot();
    assert_eq!(counters.executed, 6);
    assert_eq!(counters.success, 2);
    assert_eq!(counters.failures.get(&FailureKind::Status(404)), Some(&2));
    assert_eq!(counters.failures.get(&FailureKind::Transport), Some(&1));
    assert_eq!(counters.failures.get(&FailureKind::Aborted), Some(&1));
    assert_eq!(counters.success + counters.failure_total(), counters.executed);
}

#[test]
fn test_failure_keys_appear_lazily() {
    let acc = Accumulator::new("http://example.com", 1);
    acc.record(Outcome::Status(503));

    let counters = acc.snapshot();
    assert_eq!(counters.failures.len(), 1);
    assert!(!counters.failures.contains_key(&FailureKind::Status(404)));
}

#[test]
fn test_failure_kinds_sort_codes_then_transport() {
    let mut kinds = vec![
        FailureKind::Aborted,
        FailureKind::Transport,
        FailureKind::Status(503),
        FailureKind::Status(404),
    ];
    kinds.sort();
    assert_eq!(
        kinds,
        vec![
            FailureKind::Status(404),
            FailureKind::Status(503),
            FailureKind::Transport,
            FailureKind::Aborted,
        ]
    );
}

#[test]
fn test_finish_seals_counters_and_elapsed() {
    let acc = Accumulator::new("http://example.com", 3);
    acc.record(Outcome::Status(200));
    acc.record(Outcome::Status(500));

    let summary = acc.finish(Duration::from_millis(1500));
    assert_eq!(summary.target, "http://example.com");
    assert_eq!(summary.total_requested, 3);
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.failures_for(FailureKind::Status(500)), 1);
    assert_eq!(summary.failures_for(FailureKind::Transport), 0);
    assert_eq!(summary.elapsed, Duration::from_millis(1500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_records_are_never_lost() {
    const N: usize = 10_000;
    let acc = Arc::new(Accumulator::new("http://example.com", N as u64));

    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let acc = Arc::clone(&acc);
        handles.push(tokio::spawn(async move {
            let status = if i % 4 == 0 { 500 } else { 200 };
            acc.record(Outcome::Status(status));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let counters = acc.snapshot();
    assert_eq!(counters.executed, N as u64);
    assert_eq!(counters.success, (N - N / 4) as u64);
    assert_eq!(counters.failures.get(&FailureKind::Status(500)), Some(&((N / 4) as u64)));
}

#[test]
fn test_concurrent_records_from_os_threads() {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 1_000;
    let acc = Accumulator::new("http://example.com", (THREADS * PER_THREAD) as u64);

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..PER_THREAD {
                    acc.record(Outcome::Status(200));
                }
            });
        }
    });

    let summary = acc.finish(Duration::ZERO);
    assert_eq!(summary.executed, (THREADS * PER_THREAD) as u64);
    assert_eq!(summary.success, summary.executed);
}
