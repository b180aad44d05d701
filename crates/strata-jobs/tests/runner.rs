//! Integration tests for the parallel job runner.

use std::{
    ops::Range,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use strata_jobs::{JobError, ParallelJobRunner};

#[test]
fn test_counter_over_disjoint_ranges() {
    let runner = ParallelJobRunner::new(4).unwrap();
    let counter = AtomicUsize::new(0);
    let seen: Mutex<Vec<(usize, Range<usize>)>> = Mutex::new(Vec::new());

    runner
        .run_ranges(1000, |task, range| {
            for _ in range.clone() {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            seen.lock().push((task, range));
        })
        .unwrap();

    assert_eq!(counter.load(Ordering::Relaxed), 1000);

    let mut seen = seen.into_inner();
    seen.sort_by_key(|(task, _)| *task);
    assert_eq!(seen.len(), 4);
    for pair in seen.windows(2) {
        let (_, left) = &pair[0];
        let (_, right) = &pair[1];
        assert_eq!(left.end, right.start, "ranges must be adjacent and disjoint");
    }
    assert_eq!(seen[0].1.start, 0);
    assert_eq!(seen[3].1.end, 1000);
}

#[test]
fn test_tasks_write_disjoint_slices() {
    let runner = ParallelJobRunner::new(4).unwrap();
    let mut data = vec![0u32; 1001];

    let mut parts: Vec<&mut [u32]> = Vec::new();
    let mut rest = data.as_mut_slice();
    for range in strata_jobs::partition(1001, runner.thread_count(), 1) {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
        parts.push(head);
        rest = tail;
    }

    runner
        .run(&mut parts, |task, slice| {
            for value in slice.iter_mut() {
                *value = task as u32 + 1;
            }
        })
        .unwrap();

    assert!(data.iter().all(|&v| (1..=4).contains(&v)));
    assert_eq!(data[0], 1);
    assert_eq!(data[1000], 4);
}

#[test]
fn test_nested_job_is_rejected() {
    let runner = ParallelJobRunner::new(2).unwrap();
    let nested_errors = AtomicUsize::new(0);
    let mut tasks = [(), ()];

    runner
        .run(&mut tasks, |_, _| {
            let mut inner = [()];
            match runner.run(&mut inner, |_, _| {}) {
                Err(JobError::JobInFlight(_)) => {
                    nested_errors.fetch_add(1, Ordering::Relaxed);
                }
                other => panic!("nested job should fail, got {other:?}"),
            }
        })
        .unwrap();

    assert_eq!(nested_errors.load(Ordering::Relaxed), 2);

    // The runner is usable again once the outer job is done.
    let mut tasks = [0u8, 0];
    runner.run(&mut tasks, |_, v| *v = 1).unwrap();
    assert_eq!(tasks, [1, 1]);
}

#[test]
fn test_worker_panic_is_reraised_after_quiescence() {
    let runner = ParallelJobRunner::new(3).unwrap();
    let completed = AtomicUsize::new(0);
    let mut tasks = [0usize, 1, 2];

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runner.run(&mut tasks, |index, _| {
            if index == 2 {
                panic!("task two failed");
            }
            completed.fetch_add(1, Ordering::Relaxed);
        })
    }));

    assert!(result.is_err());
    assert_eq!(completed.load(Ordering::Relaxed), 2);

    // Handshake state is intact for the next job.
    let total = AtomicUsize::new(0);
    runner
        .run_ranges(90, |_, range| {
            total.fetch_add(range.len(), Ordering::Relaxed);
        })
        .unwrap();
    assert_eq!(total.load(Ordering::Relaxed), 90);
}

#[test]
fn test_many_short_jobs() {
    let runner = ParallelJobRunner::new(4).unwrap();
    let mut sums = [0u64; 4];

    for round in 0..1000u64 {
        runner
            .run(&mut sums, |index, sum| *sum += round + index as u64)
            .unwrap();
    }

    let base: u64 = (0..1000).sum();
    assert_eq!(sums, [base, base + 1000, base + 2000, base + 3000]);
}

#[test]
fn test_drop_joins_workers() {
    let runner = ParallelJobRunner::with_name("short-lived", 3).unwrap();
    let mut tasks = [0u8; 3];
    runner.run(&mut tasks, |_, v| *v += 1).unwrap();
    assert!(runner.is_started());
    drop(runner);
}

/// User plus system CPU time of this process, in clock ticks.
#[cfg(target_os = "linux")]
fn process_cpu_ticks() -> u64 {
    let stat = std::fs::read_to_string("/proc/self/stat").unwrap();
    // Fields after the parenthesised command name; utime and stime are 14 and 15.
    let rest = &stat[stat.rfind(')').unwrap() + 2..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    fields[11].parse::<u64>().unwrap() + fields[12].parse::<u64>().unwrap()
}

#[cfg(target_os = "linux")]
#[test]
fn test_idle_workers_block_while_slow_task_runs() {
    let runner = ParallelJobRunner::new(4).unwrap();
    let mut warmup = [(); 4];
    runner.run(&mut warmup, |_, ()| {}).unwrap();

    let before = process_cpu_ticks();
    let mut tasks = [(); 4];
    runner
        .run(&mut tasks, |index, ()| {
            if index == 1 {
                std::thread::sleep(std::time::Duration::from_millis(500));
            }
        })
        .unwrap();
    let burned = process_cpu_ticks() - before;

    // Three idle threads spinning through the sleep would burn 50+ ticks.
    assert!(burned < 20, "{burned} ticks burned while one task slept");
}
