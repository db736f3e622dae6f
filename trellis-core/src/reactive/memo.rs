//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs until the first
//!    read.
//!
//! 2. A read recomputes only when the memo is dirty. Otherwise it returns
//!    the cached value.
//!
//! 3. When a dependency changes, the effect's scheduler marks the memo
//!    dirty instead of recomputing it. If the memo was clean, readers of the
//!    memo are notified in turn through the memo's own value slot.
//!
//! 4. Every read tracks that slot, so effects and other memos can depend on
//!    a memo exactly as they depend on a reactive object.
//!
//! Memos that are never read again stay dirty and cost nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::untrack;
use super::effect::{Effect, EffectOptions};
use super::runtime::{DepKey, Runtime, Target, TriggerOp};
use super::subscriber::SubscriberId;
use crate::value::ObjectId;

struct MemoInner<T> {
    /// The memo's slot in the dependency store.
    target: Target,
    effect: Effect<T>,
    value: RwLock<Option<T>>,
    dirty: Arc<AtomicBool>,
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::forget(self.target.id());
    }
}

/// A cached derived value that recomputes only when dependencies change.
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let target = Target::new(ObjectId::new(), false);
        let dirty = Arc::new(AtomicBool::new(true));

        let flag = dirty.clone();
        let options = EffectOptions::new().lazy(true).scheduler(move |_job| {
            if !flag.swap(true, Ordering::AcqRel) {
                Runtime::trigger(target, DepKey::Value, TriggerOp::Set);
            }
        });

        Self {
            inner: Arc::new(MemoInner {
                target,
                effect: Effect::with_options(compute, options),
                value: RwLock::new(None),
                dirty,
            }),
        }
    }

    /// Get the subscriber ID of the memo's computation.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.effect.id()
    }

    /// Id of the memo's value slot in the dependency store.
    pub fn slot_id(&self) -> ObjectId {
        self.inner.target.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    pub fn get(&self) -> T {
        let value = match self.cached() {
            Some(value) => value,
            None => self.recompute(),
        };
        Runtime::track(self.inner.target.id(), DepKey::Value);
        value
    }

    /// Get the current value without subscribing the caller.
    pub fn get_untracked(&self) -> T {
        untrack(|| self.get())
    }

    fn cached(&self) -> Option<T> {
        if self.inner.dirty.load(Ordering::Acquire) {
            return None;
        }
        self.inner.value.read().clone()
    }

    fn recompute(&self) -> T {
        let value = self.inner.effect.run();
        *self.inner.value.write() = Some(value.clone());
        self.inner.dirty.store(false, Ordering::Release);
        value
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Whether a value has been computed at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Memo<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("slot", &self.inner.target.id().raw())
            .field("dirty", &self.is_dirty())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// Create a memoized read-only value from `getter`.
pub fn derive<T, F>(getter: F) -> Memo<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::reactive;
    use crate::reactive::effect::effect;
    use crate::value::{Object, Value};
    use std::sync::atomic::AtomicI32;

    fn number(state: &crate::proxy::Reactive, key: &str) -> f64 {
        state.get(key).unwrap().as_number().unwrap_or_default()
    }

    #[test]
    fn memo_lazy_evaluation() {
        let compute_count = Arc::new(AtomicI32::new(0));
        let compute_count_clone = compute_count.clone();

        let memo = Memo::new(move || {
            compute_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        // Not computed yet
        assert_eq!(compute_count.load(Ordering::SeqCst), 0);
        assert!(!memo.has_value());

        // First access computes
        assert_eq!(memo.get(), 42);
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);

        // Second access uses cache
        assert_eq!(memo.get(), 42);
        assert_eq!(compute_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_only_on_read_after_change() {
        let state = reactive(&Object::record([("foo", 1)]));
        let s = state.clone();
        let memo = derive(move || number(&s, "foo") * 2.0);

        assert_eq!(memo.get(), 2.0);
        assert!(!memo.is_dirty());

        state.set("foo", 2).unwrap();
        state.set("foo", 3).unwrap();
        assert!(memo.is_dirty());
        assert_eq!(memo.compute_count(), 1);

        assert_eq!(memo.get(), 6.0);
        assert_eq!(memo.compute_count(), 2);
    }

    #[test]
    fn effects_depend_on_memos() {
        let state = reactive(&Object::record([("foo", 1)]));
        let s = state.clone();
        let memo = derive(move || number(&s, "foo") + 1.0);

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (m, log) = (memo.clone(), seen.clone());
        let _effect = effect(move || log.lock().push(m.get()));

        state.set("foo", 5).unwrap();
        assert_eq!(*seen.lock(), vec![2.0, 6.0]);
    }

    #[test]
    fn memos_compose() {
        let state = reactive(&Object::record([("foo", 1)]));
        let s = state.clone();
        let doubled = derive(move || number(&s, "foo") * 2.0);
        let d = doubled.clone();
        let quadrupled = derive(move || d.get() * 2.0);

        assert_eq!(quadrupled.get(), 4.0);
        state.set("foo", 2).unwrap();
        assert!(quadrupled.is_dirty());
        assert_eq!(quadrupled.get(), 8.0);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let memo = derive(|| Value::from("x"));
        let m = memo.clone();
        let _effect = effect(move || {
            m.get_untracked();
        });
        assert_eq!(Runtime::subscriber_count(memo.slot_id(), &DepKey::Value), 0);
    }

    #[test]
    fn dropping_a_memo_forgets_its_slot() {
        let memo = derive(|| 1);
        let slot = memo.slot_id();
        let m = memo.clone();
        let watcher = effect(move || m.get());
        assert!(Runtime::is_tracked(slot));

        drop(watcher);
        drop(memo);
        assert!(!Runtime::is_tracked(slot));
    }
}
