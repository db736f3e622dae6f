//! Watchers
//!
//! A watcher observes a source and calls back with the new and the previous
//! value whenever the source changes. The source is either a getter or a
//! reactive object, which is then observed deeply.
//!
//! # How Watchers Work
//!
//! The source is turned into a getter and run by a lazy effect whose
//! scheduler is the watcher's job:
//!
//! 1. Re-run the getter to obtain the new value (and re-track).
//! 2. Call the cleanup the previous callback registered, if any.
//! 3. Call the callback with `(new, old)`.
//! 4. Remember `new` as the next `old`.
//!
//! With [`Flush::Sync`] the job runs inside the trigger that caused it.
//! With [`Flush::Post`] it is queued instead, keyed by the watcher, so any
//! number of changes before the next flush produce a single callback.
//!
//! The job queue belongs to the thread that made the write. A turn on that
//! thread ends at [`flush_jobs`](super::scheduler::flush_jobs) or when its
//! outermost [`batch`](super::scheduler::batch) returns. Nothing else drains
//! the queue, so a write made on another thread queues the callback on that
//! other thread.
//!
//! A queued job holds the watcher weakly. Dropping the last [`Watcher`]
//! handle cancels any callback still in the queue.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::effect::{Effect, EffectOptions};
use super::scheduler::{queue_job, Job};
use super::subscriber::SubscriberId;
use crate::proxy::Reactive;
use crate::value::{ObjectId, Shape, Value};

/// When a watcher's callback runs relative to the change that caused it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flush {
    /// Synchronously, inside the write.
    #[default]
    Sync,
    /// Queued on the writing thread's job queue. Runs when that thread
    /// calls `flush_jobs` or leaves its outermost `batch`, never on its own.
    Post,
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call back once at setup, with no previous value.
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }
}

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Callback<T> = Box<dyn Fn(&T, Option<&T>, &OnCleanup) + Send + Sync>;
type CleanupFn = Box<dyn FnOnce() + Send>;

/// Something a watcher can observe.
pub trait WatchSource<T> {
    fn into_getter(self) -> Getter<T>;
}

impl<T, F> WatchSource<T> for F
where
    F: Fn() -> T + Send + Sync + 'static,
{
    fn into_getter(self) -> Getter<T> {
        Box::new(self)
    }
}

/// A reactive object is watched deeply: a change anywhere inside it is a
/// change of the source. The value handed to the callback is the wrapper
/// itself.
impl WatchSource<Value> for Reactive {
    fn into_getter(self) -> Getter<Value> {
        Box::new(move || {
            let value = Value::Reactive(self.clone());
            traverse(&value, &mut HashSet::new());
            value
        })
    }
}

/// Read everything reachable from `value` so the running computation
/// depends on all of it.
fn traverse(value: &Value, seen: &mut HashSet<ObjectId>) {
    let Value::Reactive(object) = value else {
        return;
    };
    if !seen.insert(object.raw().id()) {
        return;
    }

    // Reads only fail on shape mismatch, which cannot happen here.
    let children = match object.shape() {
        Shape::Set => object.values().unwrap_or_default(),
        Shape::Record | Shape::List | Shape::Map => object
            .entries()
            .map(|entries| entries.into_iter().map(|(_, v)| v).collect())
            .unwrap_or_default(),
    };
    for child in &children {
        traverse(child, seen);
    }
}

/// Lets a callback register work to run before the next callback (or when
/// the watcher stops), typically to cancel whatever the previous callback
/// started.
#[derive(Clone)]
pub struct OnCleanup {
    slot: Arc<Mutex<Option<CleanupFn>>>,
}

impl OnCleanup {
    /// Register `cleanup`, replacing any cleanup registered earlier in the
    /// same callback.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let replaced = self.slot.lock().replace(Box::new(cleanup));
        drop(replaced);
    }

    fn run_pending(&self) {
        let pending = self.slot.lock().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

struct WatchState<T> {
    effect: Effect<T>,
    callback: Callback<T>,
    old: Mutex<Option<T>>,
    on_cleanup: OnCleanup,
}

impl<T> WatchState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn job(&self) {
        if self.effect.is_disposed() {
            return;
        }
        let new = self.effect.run();
        self.on_cleanup.run_pending();

        let old = self.old.lock().clone();
        (self.callback)(&new, old.as_ref(), &self.on_cleanup);

        *self.old.lock() = Some(new);
    }
}

impl<T> Drop for WatchState<T> {
    fn drop(&mut self) {
        self.on_cleanup.run_pending();
    }
}

trait WatchHandle: Send + Sync {
    fn stop(&self);
    fn is_stopped(&self) -> bool;
    fn subscriber_id(&self) -> SubscriberId;
}

impl<T> WatchHandle for WatchState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn stop(&self) {
        self.effect.dispose();
        self.on_cleanup.run_pending();
    }

    fn is_stopped(&self) -> bool {
        self.effect.is_disposed()
    }

    fn subscriber_id(&self) -> SubscriberId {
        self.effect.id()
    }
}

/// Handle to a running watcher. Dropping the last clone ends the watch,
/// runs any pending cleanup and cancels a queued callback.
#[must_use = "a watcher stops once its handle is dropped"]
#[derive(Clone)]
pub struct Watcher {
    state: Arc<dyn WatchHandle>,
}

impl Watcher {
    /// Stop watching. Any pending cleanup runs now.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// Subscriber ID of the watcher's effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.state.subscriber_id()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.subscriber_id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Watch `source` and call `callback(new, old, on_cleanup)` when it changes.
///
/// Unless `options.immediate` is set, nothing is called at setup; the first
/// callback sees the value captured at setup as `old`.
///
/// With [`Flush::Post`] the callback waits for the writing thread to call
/// `flush_jobs` or to leave its outermost `batch`.
pub fn watch<S, T, F>(source: S, callback: F, options: WatchOptions) -> Watcher
where
    S: WatchSource<T>,
    T: Clone + Send + Sync + 'static,
    F: Fn(&T, Option<&T>, &OnCleanup) + Send + Sync + 'static,
{
    let getter = source.into_getter();
    let flush = options.flush;

    let state = Arc::new_cyclic(|weak: &Weak<WatchState<T>>| {
        let weak = weak.clone();
        let scheduler = move |_job: Job| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            match flush {
                Flush::Sync => state.job(),
                Flush::Post => {
                    let id = state.effect.id();
                    let queued = Arc::downgrade(&state);
                    queue_job(Job::new(id, move || {
                        if let Some(state) = queued.upgrade() {
                            state.job();
                        }
                    }));
                }
            }
        };

        WatchState {
            effect: Effect::with_options(getter, EffectOptions::new().lazy(true).scheduler(scheduler)),
            callback: Box::new(callback),
            old: Mutex::new(None),
            on_cleanup: OnCleanup {
                slot: Arc::new(Mutex::new(None)),
            },
        }
    });

    if options.immediate {
        state.job();
    } else {
        let baseline = state.effect.run();
        *state.old.lock() = Some(baseline);
    }

    Watcher { state }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
