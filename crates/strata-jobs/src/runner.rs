//! Fixed-size worker pool executing one task per thread.
//!
//! The calling thread is worker 0; `thread_count - 1` background workers are
//! started on the first job and parked between jobs.
//!
//! # Handshake
//!
//! ```text
//! caller                                  worker i
//! ──────                                  ────────
//! publish job, finished = 0
//! start.set()                             spin on barrier (bounded)
//! barrier += 1  ───────────────────────▶  observe barrier change
//! run task 0                              wait for a newer start generation
//!                                         run task i
//!                                         finished += 1
//!                                         last one: start.reset(), all_finished.set()
//! all_finished.wait(), reset()
//! ```
//!
//! `start` is signaled before the barrier moves, and every signal advances its
//! generation. A worker that exhausted its spin budget blocks until `start`
//! reaches a generation newer than the last job it ran, so it neither misses
//! a job nor wakes early on the still-signaled event of the previous one.

use std::{
    any::Any,
    cell::UnsafeCell,
    fmt,
    num::NonZeroUsize,
    ops::Range,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    error::{JobError, JobResult},
    event::ManualResetEvent,
    partition::partition,
};

/// Iterations a parked worker spins on the barrier before blocking on `start`.
const SPIN_LIMIT: u32 = 1 << 12;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// A job as the workers see it: a type-erased pointer into the caller's frame.
#[derive(Clone, Copy)]
struct PublishedJob {
    frame: *const (),
    execute: unsafe fn(*const (), usize),
    task_count: usize,
}

impl PublishedJob {
    const IDLE: Self = Self {
        frame: std::ptr::null(),
        execute: execute_nothing,
        task_count: 0,
    };
}

unsafe fn execute_nothing(_frame: *const (), _index: usize) {}

/// Borrowed job state living on the caller's stack for the duration of `run`.
struct JobFrame<'a, T, F> {
    tasks: *mut T,
    len: usize,
    body: &'a F,
}

/// Run task `index` of the frame at `frame`.
///
/// # Safety
///
/// `frame` must point to a live `JobFrame<'_, T, F>` and no other thread may
/// execute the same `index` concurrently.
unsafe fn execute_task<T, F>(frame: *const (), index: usize)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync,
{
    // SAFETY: caller guarantees `frame` is a live JobFrame of these types
    let frame = unsafe { &*frame.cast::<JobFrame<'_, T, F>>() };
    if index < frame.len {
        // SAFETY: index is in bounds and owned exclusively by this thread
        let task = unsafe { &mut *frame.tasks.add(index) };
        (frame.body)(index, task);
    }
}

/// State shared between the runner handle and its workers.
struct Shared {
    /// Number of background workers (threads minus the caller).
    worker_count: usize,
    barrier: CachePadded<AtomicU64>,
    finished: CachePadded<AtomicUsize>,
    start: ManualResetEvent,
    all_finished: ManualResetEvent,
    job: UnsafeCell<PublishedJob>,
    panic: Mutex<Option<PanicPayload>>,
    shutdown: AtomicBool,
}

// SAFETY: `job` is written only by the thread holding the runner's in-flight
// flag, before the Release increment of `barrier`; workers read it only after
// an Acquire load observed that increment, and the caller does not write it
// again until every worker has reported through `finished`.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn record_panic(&self, payload: PanicPayload) {
        let mut slot = self.panic.lock();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }
}

/// Clears the in-flight flag when a job ends, including by unwinding.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A fixed-size pool running one partition of a job per thread.
///
/// At most one job may be in flight per runner. Tasks cannot be cancelled: a
/// task that never returns stalls the runner.
pub struct ParallelJobRunner {
    name: String,
    thread_count: usize,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    in_flight: AtomicBool,
}

impl ParallelJobRunner {
    /// Create a runner with `thread_count` threads, the caller included.
    pub fn new(thread_count: usize) -> JobResult<Self> {
        Self::with_name("strata-worker", thread_count)
    }

    /// Create a runner whose worker threads are named `{name}-{index}`.
    pub fn with_name(name: impl Into<String>, thread_count: usize) -> JobResult<Self> {
        let thread_count = NonZeroUsize::new(thread_count).ok_or(JobError::InvalidThreadCount)?;
        Ok(Self::build(name.into(), thread_count))
    }

    /// The process-wide runner, sized to the available parallelism.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ParallelJobRunner> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let threads = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
            Self::build("strata-global".to_owned(), threads)
        })
    }

    fn build(name: String, thread_count: NonZeroUsize) -> Self {
        let thread_count = thread_count.get();
        Self {
            name,
            thread_count,
            shared: Arc::new(Shared {
                worker_count: thread_count - 1,
                barrier: CachePadded::new(AtomicU64::new(0)),
                finished: CachePadded::new(AtomicUsize::new(0)),
                start: ManualResetEvent::new(false),
                all_finished: ManualResetEvent::new(false),
                job: UnsafeCell::new(PublishedJob::IDLE),
                panic: Mutex::new(None),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Name used for worker threads and log records.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total threads executing a job, the caller included.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Whether the background workers have been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Execute `body` once per task, task `i` on thread `i`.
    ///
    /// The caller executes task 0 synchronously and returns once every task
    /// has finished. A panic in any task is re-raised here after all tasks
    /// are done.
    pub fn run<T, F>(&self, tasks: &mut [T], body: F) -> JobResult<()>
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        if tasks.len() > self.thread_count {
            return Err(JobError::TooManyTasks {
                tasks: tasks.len(),
                threads: self.thread_count,
            });
        }
        if self.in_flight.swap(true, Ordering::Acquire) {
            return Err(JobError::JobInFlight(self.name.clone()));
        }
        let _guard = InFlightGuard(&self.in_flight);

        if tasks.len() <= 1 || self.shared.worker_count == 0 {
            for (index, task) in tasks.iter_mut().enumerate() {
                body(index, task);
            }
            return Ok(());
        }

        self.ensure_started()?;

        let frame = JobFrame {
            tasks: tasks.as_mut_ptr(),
            len: tasks.len(),
            body: &body,
        };
        let frame_ptr = std::ptr::from_ref(&frame).cast::<()>();
        let shared = &*self.shared;

        trace!(runner = %self.name, tasks = frame.len, "publishing job");

        // SAFETY: the previous job is quiescent and workers only read `job`
        // after observing the barrier increment below.
        unsafe {
            *shared.job.get() = PublishedJob {
                frame: frame_ptr,
                execute: execute_task::<T, F>,
                task_count: frame.len,
            };
        }
        shared.finished.store(0, Ordering::Relaxed);
        shared.start.set();
        shared.barrier.fetch_add(1, Ordering::Release);

        // SAFETY: task 0 is reserved for the calling thread
        let own = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            execute_task::<T, F>(frame_ptr, 0);
        }));

        shared.all_finished.wait();
        shared.all_finished.reset();

        // SAFETY: all workers have reported; nobody reads the job any more
        unsafe {
            *shared.job.get() = PublishedJob::IDLE;
        }

        let worker_panic = shared.panic.lock().take();
        if let Err(payload) = own {
            panic::resume_unwind(payload);
        }
        if let Some(payload) = worker_panic {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Split `0..len` into one disjoint range per thread and run `body` on each.
    pub fn run_ranges<F>(&self, len: usize, body: F) -> JobResult<()>
    where
        F: Fn(usize, Range<usize>) + Sync,
    {
        let mut ranges = partition(len, self.thread_count, 1);
        self.run(&mut ranges, |index, range| body(index, range.clone()))
    }

    fn ensure_started(&self) -> JobResult<()> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut workers = self.workers.lock();
        let barrier = self.shared.barrier.load(Ordering::Acquire);
        let generation = self.shared.start.generation();
        for index in workers.len() + 1..self.thread_count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", self.name))
                .spawn(move || worker_loop(&shared, index, barrier, generation))?;
            workers.push(handle);
        }

        debug!(runner = %self.name, workers = workers.len(), "started job workers");
        self.started.store(true, Ordering::Release);
        Ok(())
    }
}

fn worker_loop(shared: &Shared, index: usize, mut seen: u64, mut generation: u64) {
    loop {
        let mut spins = 0u32;
        loop {
            let current = shared.barrier.load(Ordering::Acquire);
            if current != seen {
                seen = current;
                break;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else if shared.start.generation() == generation {
                shared.start.wait_newer(generation);
            } else {
                // Start raised, barrier increment not yet visible.
                thread::yield_now();
            }
        }

        // Already satisfied: the start signal precedes the barrier increment.
        generation = shared.start.wait_newer(generation);

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        // SAFETY: published before the barrier increment observed above
        let job = unsafe { *shared.job.get() };
        if index < job.task_count {
            // SAFETY: the frame outlives the job and index is this worker's own
            let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
                (job.execute)(job.frame, index);
            }));
            if let Err(payload) = result {
                shared.record_panic(payload);
            }
        }

        let finished = shared.finished.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(
            finished <= shared.worker_count,
            "job finished counter {finished} exceeds worker count {}",
            shared.worker_count
        );
        if finished == shared.worker_count {
            shared.start.reset();
            shared.all_finished.set();
        }
    }
}

impl Drop for ParallelJobRunner {
    fn drop(&mut self) {
        let workers = std::mem::take(self.workers.get_mut());
        if workers.is_empty() {
            return;
        }

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.start.set();
        self.shared.barrier.fetch_add(1, Ordering::Release);

        for worker in workers {
            let _ = worker.join();
        }
        debug!(runner = %self.name, "stopped job workers");
    }
}

impl fmt::Debug for ParallelJobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelJobRunner")
            .field("name", &self.name)
            .field("thread_count", &self.thread_count)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
