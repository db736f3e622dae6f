//! Effect Implementation
//!
//! An Effect is a tracked computation that runs again whenever something it
//! read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. When any dependency changes, the trigger engine dispatches the
//!    effect: to its scheduler if it has one, otherwise it runs again
//!    synchronously.
//!
//! 3. Before every run, the effect leaves all the subscriber sets it joined
//!    last time and joins exactly those touched during this run. A branch
//!    that was not taken this time leaves no stale subscription.
//!
//! # Lifetime
//!
//! The dependency store only holds weak references. An effect stays
//! subscribed while at least one `Effect` handle is alive; dropping the last
//! one detaches it everywhere. `dispose()` detaches it early.
//!
//! # Differences from Memo
//!
//! - Memos cache their result; effects return it from `run()` and forget it.
//! - Memos are lazy and re-evaluate on the next read; effects are dispatched
//!   as soon as a dependency changes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::{untrack, ReactiveContext};
use super::runtime::{Computation, Dependency, Runtime};
use super::scheduler::Job;
use super::subscriber::SubscriberId;

/// Callback receiving the job of a dispatched effect instead of running it.
pub type Scheduler = Arc<dyn Fn(Job) + Send + Sync>;

/// Options for [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run. The caller runs the effect to begin tracking.
    pub lazy: bool,
    /// Receives the effect's job on every dispatch.
    pub scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

struct EffectInner<T> {
    id: SubscriberId,
    run: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<Scheduler>,
    /// Subscriber sets joined during the last run.
    dependencies: Mutex<SmallVec<[Dependency; 4]>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl<T: 'static> EffectInner<T> {
    fn execute(self: &Arc<Self>) -> T {
        if self.disposed.load(Ordering::Acquire) {
            return untrack(|| (self.run)());
        }

        self.cleanup();

        let _ctx = ReactiveContext::enter(self.clone());
        let value = (self.run)();
        self.run_count.fetch_add(1, Ordering::Relaxed);
        value
    }

    fn cleanup(&self) {
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        Runtime::cleanup(self.id, dependencies);
    }
}

impl<T: 'static> Computation for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn record_dependency(&self, dependency: Dependency) {
        self.dependencies.lock().push(dependency);
    }

    fn dispatch(self: Arc<Self>) {
        match self.scheduler.clone() {
            Some(scheduler) => {
                tracing::trace!(effect = %self.id, "scheduling effect");
                let id = self.id;
                scheduler(Job::new(id, move || {
                    self.execute();
                }));
            }
            None => {
                tracing::trace!(effect = %self.id, "running effect");
                self.execute();
            }
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        let dependencies = std::mem::take(self.dependencies.get_mut());
        Runtime::cleanup(self.id, dependencies);
    }
}

/// A tracked computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&Object::record([("count", 0)]));
///
/// let s = state.clone();
/// let effect = Effect::new(move || {
///     println!("count is {:?}", s.get("count").unwrap());
/// });
///
/// state.set("count", 5)?;  // Prints: "count is Number(5.0)"
/// ```
#[must_use = "an effect stops reacting once its last handle is dropped"]
pub struct Effect<T> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect without running it immediately.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::new().lazy(true))
    }

    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: SubscriberId::new(),
                run: Box::new(run),
                scheduler: options.scheduler,
                dependencies: Mutex::new(SmallVec::new()),
                disposed: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run the effect now and return what its function returned.
    ///
    /// A disposed effect still runs, but tracks nothing.
    pub fn run(&self) -> T {
        self.inner.execute()
    }

    /// Dispatch the effect as a trigger would: through its scheduler if it
    /// has one.
    pub fn schedule(&self) {
        if !self.is_disposed() {
            self.inner.clone().dispatch();
        }
    }

    /// Detach the effect from everything it depends on. Triggers never
    /// dispatch it again.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            self.inner.cleanup();
            tracing::debug!(effect = %self.inner.id, "effect disposed");
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Get the number of tracked runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of subscriber sets the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.inner.run_count.load(Ordering::Relaxed))
            .field("dependency_count", &self.inner.dependencies.lock().len())
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .finish()
    }
}

/// Create and run an effect.
pub fn effect<T, F>(run: F) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Effect::new(run)
}

/// Create an effect with explicit options.
pub fn effect_with<T, F>(run: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Effect::with_options(run, options)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
