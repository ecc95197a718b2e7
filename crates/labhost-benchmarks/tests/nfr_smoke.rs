//! Benchmark smoke tests for contended lockout tracking and funnel throughput.

use std::sync::Arc;
use std::time::Instant;

use labhost_benchmarks::{bench_funnel, bench_tracker};
use labhost_core::FailureCause;
use labhost_funnel::FailureHandler;

#[test]
fn benchmark_contended_lockout_smoke_prints_latency() {
    let tracker = Arc::new(bench_tracker());
    let start = Instant::now();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for round in 0..2_000 {
                    let account = if round % 2 == 0 { "tech1".to_string() } else { format!("user-{worker}") };
                    tracker.with_account(&account, |lock| {
                        if !lock.is_locked() {
                            lock.record_failure();
                        }
                        if lock.failed_attempt_count() >= 4 {
                            lock.record_success();
                        }
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker finishes");
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_lockout_elapsed_ms={elapsed_ms}");
    assert!(!tracker.is_locked("tech1"));
    // Coarse guardrail; strict limits depend on the machine.
    assert!(elapsed_ms < 5_000, "contended lockout smoke should stay bounded");
}

#[test]
fn benchmark_funnel_throughput_smoke_prints_latency() {
    let (funnel, sink) = bench_funnel();
    let start = Instant::now();

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let funnel = Arc::clone(&funnel);
            std::thread::spawn(move || {
                for index in 0..500 {
                    let cause = FailureCause::new("panic", format!("producer {producer} failure {index}"));
                    funnel.on_background_failure(cause);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer finishes");
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_funnel_elapsed_ms={elapsed_ms}");
    assert_eq!(sink.len(), 2_000);
    assert!(elapsed_ms < 5_000, "funnel smoke should stay bounded");
}
