// Job frames are handed to worker threads as raw pointers; see `runner`.
#![allow(unsafe_code)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_safety_doc)]

//! Strata jobs - a fixed-size worker pool for compute-only parallel loops.
//!
//! A [`ParallelJobRunner`] owns `thread_count - 1` background workers; the
//! thread calling [`ParallelJobRunner::run`] acts as the remaining worker.
//! Short jobs are started with a spin on a shared barrier counter, so a hot
//! loop pays no OS wake-up cost; idle workers fall back to blocking on a
//! [`ManualResetEvent`].
//!
//! ```ignore
//! let runner = ParallelJobRunner::new(4)?;
//! runner.run_ranges(rows.len(), |_, range| {
//!     for row in range {
//!         // compute on a disjoint slice of rows
//!     }
//! })?;
//! ```

mod error;
mod event;
mod partition;
mod runner;

pub use error::{JobError, JobResult};
pub use event::ManualResetEvent;
pub use partition::partition;
pub use runner::ParallelJobRunner;
