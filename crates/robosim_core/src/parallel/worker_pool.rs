//! # Worker Pool
//!
//! Fixed set of OS threads that drain an index range in batches.
//!
//! ## How a job runs
//!
//! 1. `compute` publishes the frontier `[next, end)` and wakes every worker
//! 2. Each worker claims up to `batch_size` indices under the lock, releases
//!    it, and calls the job on each claimed index
//! 3. The worker that leaves the frontier empty with nobody busy releases the
//!    completion latch; `compute` sleeps on that latch until then
//!
//! A claimed batch always runs to completion. There is no ordering between
//! indices processed by different workers.

use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::ParallelConfig;
use crate::error::{ParallelError, ParallelResult};

type Job = Arc<dyn Fn(usize) + Send + Sync>;

/// Frontier and bookkeeping shared by the dispatcher and the workers.
#[derive(Default)]
struct State {
    job: Option<Job>,
    next: usize,
    end: usize,
    busy: usize,
    panicked: bool,
    shutdown: bool,
}

impl State {
    #[inline]
    fn finished(&self) -> bool {
        self.next >= self.end && self.busy == 0
    }
}

struct Shared {
    state: Mutex<State>,
    /// Workers wait here for a job.
    work: Condvar,
    /// The dispatcher waits here for the job to drain.
    done: Condvar,
    batch_size: usize,
}

/// Fixed-size pool of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    max_workers: usize,
    /// Held for the whole of `compute`; one job at a time.
    dispatch: Mutex<()>,
}

impl WorkerPool {
    /// Creates a pool.
    ///
    /// # Arguments
    ///
    /// * `workers` - Thread count; `None` means available parallelism minus one
    /// * `batch_size` - Indices claimed per lock acquisition (at least 1)
    ///
    /// # Errors
    ///
    /// `TooManyWorkers` beyond [`Self::max_workers`], `Spawn` if the OS
    /// refuses a thread.
    pub fn new(workers: Option<usize>, batch_size: usize) -> ParallelResult<Self> {
        let max_workers = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let mut pool = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                work: Condvar::new(),
                done: Condvar::new(),
                batch_size: batch_size.max(1),
            }),
            workers: Vec::new(),
            max_workers,
            dispatch: Mutex::new(()),
        };

        tracing::debug!("detected {max_workers} cores");
        pool.set_num_workers(workers.unwrap_or(max_workers - 1))?;
        Ok(pool)
    }

    /// Creates a pool sized by the `[parallel]` configuration section.
    ///
    /// # Errors
    ///
    /// As [`Self::new`].
    pub fn from_config(config: &ParallelConfig) -> ParallelResult<Self> {
        Self::new(config.workers, config.batch_size)
    }

    /// Current number of worker threads.
    #[inline]
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Largest accepted worker count.
    #[inline]
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Indices claimed per batch.
    #[inline]
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// Stops the current workers and starts `count` new ones.
    ///
    /// # Errors
    ///
    /// `TooManyWorkers` if `count` exceeds [`Self::max_workers`] (the
    /// current workers are kept), `Spawn` if a thread fails to start.
    pub fn set_num_workers(&mut self, count: usize) -> ParallelResult<()> {
        if count > self.max_workers {
            return Err(ParallelError::TooManyWorkers {
                requested: count,
                max: self.max_workers,
            });
        }

        self.stop_workers();
        self.shared.state.lock().shutdown = false;

        for i in 0..count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("robosim-worker-{i}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| ParallelError::Spawn(e.to_string()))?;
            self.workers.push(handle);
        }

        let batch_size = self.shared.batch_size;
        tracing::info!("worker pool running {count} workers, batch size {batch_size}");
        Ok(())
    }

    /// Calls `job(i)` for every `i` in `range` and returns when all calls
    /// have finished.
    ///
    /// With zero workers the job runs inline on the calling thread.
    ///
    /// # Panics
    ///
    /// Re-raises on the calling thread if `job` panicked on a worker.
    pub fn compute<F>(&self, range: Range<usize>, job: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        if range.is_empty() {
            return;
        }
        let _dispatch = self.dispatch.lock();

        if self.workers.is_empty() {
            range.for_each(job);
            return;
        }

        let mut state = self.shared.state.lock();
        state.job = Some(Arc::new(job));
        state.next = range.start;
        state.end = range.end;
        state.panicked = false;
        self.shared.work.notify_all();

        while !state.finished() {
            self.shared.done.wait(&mut state);
        }

        state.job = None;
        let panicked = state.panicked;
        drop(state);

        assert!(!panicked, "worker pool job panicked");
    }

    /// Whether no job is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().finished()
    }

    fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.state.lock().shutdown = true;
        self.shared.work.notify_all();

        let count = self.workers.len();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("stopped {count} workers");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("max_workers", &self.max_workers)
            .field("batch_size", &self.shared.batch_size)
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }

        match claim(&mut state, shared.batch_size) {
            Some((job, batch)) => {
                let ok = MutexGuard::unlocked(&mut state, || {
                    catch_unwind(AssertUnwindSafe(|| batch.for_each(|i| job(i)))).is_ok()
                });

                state.busy -= 1;
                state.panicked |= !ok;
                if state.finished() {
                    shared.done.notify_all();
                }
            }
            None => shared.work.wait(&mut state),
        }
    }
}

/// Takes the next batch off the frontier and marks the caller busy.
fn claim(state: &mut State, batch_size: usize) -> Option<(Job, Range<usize>)> {
    if state.next >= state.end {
        return None;
    }
    let job = state.job.clone()?;

    let start = state.next;
    state.next = (start + batch_size).min(state.end);
    state.busy += 1;
    Some((job, start..state.next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn visits(n: usize) -> Arc<Vec<AtomicUsize>> {
        Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect())
    }

    #[test]
    fn test_every_index_runs_once() {
        let mut pool = WorkerPool::new(Some(0), 16).unwrap();
        pool.set_num_workers(2.min(pool.max_workers())).unwrap();
        let seen = visits(1000);

        let counter = Arc::clone(&seen);
        pool.compute(0..1000, move |i| {
            counter[i].fetch_add(1, Ordering::Relaxed);
        });

        assert!(seen.iter().all(|v| v.load(Ordering::Relaxed) == 1));
        assert!(pool.is_idle());
    }

    #[test]
    fn test_zero_workers_runs_inline() {
        let pool = WorkerPool::new(Some(0), 4).unwrap();
        assert_eq!(pool.num_workers(), 0);

        let caller = thread::current().id();
        let seen = visits(10);
        let counter = Arc::clone(&seen);
        pool.compute(3..10, move |i| {
            assert_eq!(thread::current().id(), caller);
            counter[i].fetch_add(1, Ordering::Relaxed);
        });

        let ran: Vec<usize> = seen.iter().map(|v| v.load(Ordering::Relaxed)).collect();
        assert_eq!(ran, vec![0, 0, 0, 1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_repeated_jobs() {
        let mut pool = WorkerPool::new(Some(0), 3).unwrap();
        pool.set_num_workers(1.min(pool.max_workers())).unwrap();

        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let total = Arc::clone(&total);
            pool.compute(0..50, move |i| {
                total.fetch_add(i, Ordering::Relaxed);
            });
        }
        assert_eq!(total.load(Ordering::Relaxed), 20 * (0..50).sum::<usize>());
    }

    #[test]
    fn test_resize_limits() {
        let mut pool = WorkerPool::new(Some(0), 16).unwrap();
        let max = pool.max_workers();
        assert!(matches!(
            pool.set_num_workers(max + 1),
            Err(ParallelError::TooManyWorkers { .. })
        ));
        assert_eq!(pool.num_workers(), 0);

        pool.set_num_workers(max).unwrap();
        assert_eq!(pool.num_workers(), max);
        assert_eq!(pool.batch_size(), 16);
    }

    #[test]
    fn test_from_config() {
        let config = ParallelConfig {
            workers: Some(0),
            batch_size: 8,
        };
        let pool = WorkerPool::from_config(&config).unwrap();
        assert_eq!(pool.num_workers(), 0);
        assert_eq!(pool.batch_size(), 8);

        let config = ParallelConfig {
            workers: Some(pool.max_workers() + 1),
            batch_size: 8,
        };
        assert!(matches!(
            WorkerPool::from_config(&config),
            Err(ParallelError::TooManyWorkers { .. })
        ));
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        let pool = WorkerPool::new(Some(0), 0).unwrap();
        assert_eq!(pool.batch_size(), 1);
    }

    #[test]
    fn test_empty_range() {
        let pool = WorkerPool::new(None, 16).unwrap();
        pool.compute(5..5, |_| panic!("must not run"));
        assert!(pool.is_idle());
    }

    #[test]
    #[should_panic(expected = "worker pool job panicked")]
    fn test_job_panic_propagates() {
        let pool = WorkerPool::new(Some(1), 1).unwrap();
        pool.compute(0..4, |i| assert!(i != 2, "boom"));
    }
}
