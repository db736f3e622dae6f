//! Job Queue
//!
//! A job is a deferred unit of work tagged with the id of the computation
//! it belongs to. Queuing the same id twice before a flush keeps only the
//! first job, so an effect scheduled through [`queue_job`] runs at most once
//! per flush no matter how many writes hit it.
//!
//! # Flushing
//!
//! The queue belongs to the current thread and is drained explicitly with
//! [`flush_jobs`], or automatically when the outermost [`batch`] returns.
//! Either one ends a turn. Nothing drains the queue on a timer or from
//! another thread: jobs queued by writes on a thread that never flushes
//! stay queued on that thread.
//! Jobs queued while a flush is running are picked up by a later pass of
//! the same flush. The number of passes is bounded by
//! [`RuntimeConfig::max_flush_passes`](crate::config::RuntimeConfig) so two
//! effects that keep writing each other's inputs cannot spin forever.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::SubscriberId;
use crate::config::config;

/// A deferred unit of work.
#[derive(Clone)]
pub struct Job {
    id: SubscriberId,
    task: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    pub fn new<F>(id: SubscriberId, task: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id,
            task: Arc::new(task),
        }
    }

    /// Id of the computation this job belongs to.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn run(&self) {
        (self.task)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

#[derive(Default)]
struct JobQueue {
    jobs: IndexMap<SubscriberId, Job>,
    flushing: bool,
    batch_depth: usize,
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::default());
}

/// Queue `job` for the next flush unless a job with the same id is already
/// waiting.
///
/// The job lands on the calling thread's queue and runs only when that
/// thread calls [`flush_jobs`] or leaves its outermost [`batch`].
///
/// The signature matches an effect scheduler, so
/// `EffectOptions::new().scheduler(queue_job)` defers an effect to the
/// queue.
pub fn queue_job(job: Job) {
    let duplicate = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.jobs.contains_key(&job.id) {
            Some(job)
        } else {
            queue.jobs.insert(job.id, job);
            None
        }
    });
    drop(duplicate);
}

/// Number of jobs waiting for a flush.
pub fn pending_jobs() -> usize {
    QUEUE.with(|queue| queue.borrow().jobs.len())
}

/// Whether a [`batch`] is open on this thread.
pub fn is_batching() -> bool {
    QUEUE.with(|queue| queue.borrow().batch_depth > 0)
}

/// Run every queued job, in queue order, until the queue is empty.
///
/// A call made while a flush is already running returns immediately; the
/// running flush picks up anything queued in the meantime.
pub fn flush_jobs() {
    let started = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        !std::mem::replace(&mut queue.flushing, true)
    });
    if !started {
        return;
    }

    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            QUEUE.with(|queue| queue.borrow_mut().flushing = false);
        }
    }
    let _guard = FlushGuard;

    let max_passes = config().max_flush_passes;
    let mut passes = 0;
    loop {
        let jobs: Vec<Job> =
            QUEUE.with(|queue| queue.borrow_mut().jobs.drain(..).map(|(_, job)| job).collect());
        if jobs.is_empty() {
            break;
        }
        if passes == max_passes {
            tracing::error!(
                dropped = jobs.len(),
                max_passes,
                "job queue did not settle, dropping remaining jobs"
            );
            break;
        }
        passes += 1;
        tracing::debug!(pass = passes, jobs = jobs.len(), "flushing jobs");

        for job in jobs {
            job.run();
        }
    }
}

/// Run `f` and flush the queue once the outermost batch returns.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    QUEUE.with(|queue| queue.borrow_mut().batch_depth += 1);

    struct BatchGuard;
    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = QUEUE.with(|queue| {
                let mut queue = queue.borrow_mut();
                queue.batch_depth -= 1;
                queue.batch_depth
            });
            if depth == 0 && !std::thread::panicking() {
                flush_jobs();
            }
        }
    }
    let _guard = BatchGuard;

    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_job(id: SubscriberId, count: &Arc<AtomicI32>) -> Job {
        let count = count.clone();
        Job::new(id, move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn jobs_with_the_same_id_collapse() {
        let count = Arc::new(AtomicI32::new(0));
        let id = SubscriberId::new();

        queue_job(counting_job(id, &count));
        queue_job(counting_job(id, &count));
        queue_job(counting_job(SubscriberId::new(), &count));
        assert_eq!(pending_jobs(), 2);

        flush_jobs();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(pending_jobs(), 0);
    }

    #[test]
    fn jobs_run_in_queue_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            queue_job(Job::new(SubscriberId::new(), move || order.lock().push(n)));
        }
        flush_jobs();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_the_same_flush() {
        let count = Arc::new(AtomicI32::new(0));
        let follow_up = counting_job(SubscriberId::new(), &count);
        queue_job(Job::new(SubscriberId::new(), move || queue_job(follow_up.clone())));

        flush_jobs();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_flushes_on_exit() {
        let count = Arc::new(AtomicI32::new(0));
        let id = SubscriberId::new();

        batch(|| {
            queue_job(counting_job(id, &count));
            batch(|| queue_job(counting_job(id, &count)));
            assert!(is_batching());
            assert_eq!(count.load(Ordering::SeqCst), 0);
        });

        assert!(!is_batching());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runaway_flush_is_bounded() {
        fn requeue(id: SubscriberId, runs: Arc<AtomicI32>) -> Job {
            Job::new(id, move || {
                runs.fetch_add(1, Ordering::SeqCst);
                queue_job(requeue(id, runs.clone()));
            })
        }

        let runs = Arc::new(AtomicI32::new(0));
        queue_job(requeue(SubscriberId::new(), runs.clone()));
        flush_jobs();

        assert_eq!(runs.load(Ordering::SeqCst) as usize, config().max_flush_passes);
        assert_eq!(pending_jobs(), 0);
    }
}
