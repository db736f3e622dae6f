//! Reactive Runtime
//!
//! The runtime owns the dependency store and the trigger engine. It connects
//! reads made through reactive wrappers and memos to the computations that
//! made them, and re-runs those computations when the data changes.
//!
//! # How It Works
//!
//! 1. A read inside a running computation calls [`Runtime::track`] with the
//!    object it read and the key it read. The runtime adds the computation
//!    to that (object, key) subscriber set, and the computation remembers
//!    the set so it can leave it later.
//!
//! 2. A write calls [`Runtime::trigger`]. The runtime collects the
//!    subscribers of the written key plus the structural keys the write
//!    affects:
//!    a. Adding or deleting a set/map/record entry also notifies `Iterate`
//!    b. Adding a list item also notifies `Length`
//!    c. Resizing a list notifies every index cut off and every index `has`
//!       reader
//!    d. Clearing a collection notifies every key of that collection
//!    e. Adding or deleting a key also notifies `has` readers of that key
//!
//!    A write that adds a key without changing the value read there (a
//!    missing field set to `Undefined`, an inherited field set to the value
//!    it inherits) triggers only the key's presence, never its value.
//!
//! 3. Collected subscribers are deduplicated, the running computation is
//!    skipped, and each one is dispatched: through its scheduler if it has
//!    one, otherwise by running it again.
//!
//! # Thread Safety
//!
//! The store is a process-wide sharded map keyed by object id. Subscriber
//! sets hold weak references, so a computation lives exactly as long as
//! its handle. No store lock is held while a computation runs: trigger
//! snapshots the subscribers first and dispatches afterwards.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::value::{EntryKey, ObjectId};

/// Something the trigger engine can notify: an effect, or the effect that
/// backs a memo or a watcher.
pub(crate) trait Computation: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Remember a subscriber set this computation was added to.
    fn record_dependency(&self, dependency: Dependency);

    /// React to a change: call the scheduler, or run again.
    fn dispatch(self: Arc<Self>);

    fn is_disposed(&self) -> bool;
}

/// The key a dependency is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A record field.
    Name(Arc<str>),
    /// A list index.
    Index(usize),
    /// A set member or map key.
    Entry(EntryKey),
    /// The set of entries, as read by iteration and size.
    Iterate,
    /// The length of a list.
    Length,
    /// The cached value of a memo.
    Value,
    /// Whether the inner key is present, as read by `has`.
    Has(Box<DepKey>),
}

impl DepKey {
    /// The presence key for this key.
    pub fn presence(&self) -> DepKey {
        match self {
            DepKey::Has(_) => self.clone(),
            other => DepKey::Has(Box::new(other.clone())),
        }
    }
}

/// What a write did, from the trigger engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing entry got a new value.
    Set,
    /// A new entry appeared. Triggered on a value key when the value read
    /// there changed, otherwise on its presence key.
    Add,
    /// An entry was removed.
    Delete,
    /// A list length was assigned.
    Resize { len: usize },
    /// Every entry of a collection was removed.
    Clear,
}

/// An object as seen by the trigger engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    id: ObjectId,
    indexed: bool,
}

impl Target {
    pub fn new(id: ObjectId, indexed: bool) -> Self {
        Self { id, indexed }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the object is a list.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
}

/// One subscriber set a computation belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Dependency {
    pub(crate) target: ObjectId,
    pub(crate) key: DepKey,
}

type Subscribers = IndexMap<SubscriberId, Weak<dyn Computation>>;
type DepsMap = HashMap<DepKey, Subscribers>;

/// The global reactive runtime.
pub struct Runtime;

// Object id -> key -> subscribers. Weak refs so the store never keeps a
// computation alive.
static STORE: OnceLock<DashMap<ObjectId, DepsMap>> = OnceLock::new();

fn get_store() -> &'static DashMap<ObjectId, DepsMap> {
    STORE.get_or_init(DashMap::new)
}

impl Runtime {
    /// Subscribe the running computation to `(target, key)`.
    ///
    /// Does nothing outside a computation or while tracking is paused.
    pub fn track(target: ObjectId, key: DepKey) {
        if !ReactiveContext::should_track() {
            return;
        }
        let Some(active) = ReactiveContext::current() else {
            return;
        };
        let subscriber = active.subscriber_id();

        let inserted = get_store()
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(subscriber, Arc::downgrade(&active))
            .is_none();

        if inserted {
            tracing::trace!(target = target.raw(), ?key, %subscriber, "track");
            active.record_dependency(Dependency { target, key });
        }
    }

    /// Notify the subscribers affected by a write to `(target, key)`.
    pub fn trigger(target: Target, key: DepKey, op: TriggerOp) {
        let active = ReactiveContext::current_subscriber();

        let to_run = {
            let Some(deps) = get_store().get(&target.id()) else {
                return;
            };

            let mut to_run = Subscribers::new();
            let mut collect = |subscribers: Option<&Subscribers>| {
                for (id, weak) in subscribers.into_iter().flatten() {
                    if Some(*id) != active {
                        to_run.entry(*id).or_insert_with(|| weak.clone());
                    }
                }
            };

            match op {
                TriggerOp::Clear => {
                    for subscribers in deps.values() {
                        collect(Some(subscribers));
                    }
                }
                TriggerOp::Resize { len } if target.is_indexed() => {
                    collect(deps.get(&key));
                    // Growing or shrinking can change the presence of any index.
                    for (dep_key, subscribers) in deps.iter() {
                        let notify = match dep_key {
                            DepKey::Has(inner) => matches!(**inner, DepKey::Index(_)),
                            DepKey::Index(i) => *i >= len,
                            _ => false,
                        };
                        if notify {
                            collect(Some(subscribers));
                        }
                    }
                }
                TriggerOp::Add | TriggerOp::Delete => {
                    collect(deps.get(&key));
                    if !matches!(key, DepKey::Has(_)) {
                        collect(deps.get(&key.presence()));
                    }
                    let structural = match (op, target.is_indexed()) {
                        (TriggerOp::Add, true) => Some(DepKey::Length),
                        (_, true) => None,
                        (_, false) => Some(DepKey::Iterate),
                    };
                    if let Some(structural) = structural {
                        collect(deps.get(&structural));
                    }
                }
                _ => collect(deps.get(&key)),
            }

            to_run
        };

        if to_run.is_empty() {
            return;
        }

        tracing::trace!(
            target = target.id().raw(),
            ?key,
            ?op,
            subscribers = to_run.len(),
            "trigger"
        );

        for weak in to_run.into_values() {
            if let Some(computation) = weak.upgrade() {
                if !computation.is_disposed() {
                    computation.dispatch();
                }
            }
        }
    }

    /// Remove `subscriber` from every listed subscriber set. Sets and
    /// objects left empty are pruned.
    pub(crate) fn cleanup(
        subscriber: SubscriberId,
        dependencies: impl IntoIterator<Item = Dependency>,
    ) {
        let store = get_store();
        for Dependency { target, key } in dependencies {
            let emptied = match store.get_mut(&target) {
                Some(mut deps) => {
                    if let Some(subscribers) = deps.get_mut(&key) {
                        subscribers.shift_remove(&subscriber);
                        if subscribers.is_empty() {
                            deps.remove(&key);
                        }
                    }
                    deps.is_empty()
                }
                None => false,
            };
            if emptied {
                store.remove_if(&target, |_, deps| deps.is_empty());
            }
        }
    }

    /// Drop every subscriber set recorded for an object that no longer
    /// exists.
    pub(crate) fn forget(target: ObjectId) {
        // The removed entry drops after the shard lock is released.
        let removed = get_store().remove(&target);
        drop(removed);
    }

    /// Number of live computations subscribed to `(target, key)`.
    pub fn subscriber_count(target: ObjectId, key: &DepKey) -> usize {
        get_store()
            .get(&target)
            .and_then(|deps| {
                deps.get(key)
                    .map(|subs| subs.values().filter(|w| w.strong_count() > 0).count())
            })
            .unwrap_or(0)
    }

    /// Whether any subscriber set is recorded for `target`.
    pub fn is_tracked(target: ObjectId) -> bool {
        get_store().contains_key(&target)
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active() && ReactiveContext::should_track()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct MockComputation {
        id: SubscriberId,
        dispatched: AtomicI32,
        deps: Mutex<Vec<Dependency>>,
    }

    impl MockComputation {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                dispatched: AtomicI32::new(0),
                deps: Mutex::new(Vec::new()),
            })
        }

        // Track `keys` on `target` as if this computation read them.
        fn read(self: &Arc<Self>, target: ObjectId, keys: &[DepKey]) {
            let _ctx = ReactiveContext::enter(self.clone());
            for key in keys {
                Runtime::track(target, key.clone());
            }
        }

        fn count(&self) -> i32 {
            self.dispatched.load(Ordering::SeqCst)
        }
    }

    impl Computation for MockComputation {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn record_dependency(&self, dependency: Dependency) {
            self.deps.lock().push(dependency);
        }

        fn dispatch(self: Arc<Self>) {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
        }

        fn is_disposed(&self) -> bool {
            false
        }
    }

    fn name(s: &str) -> DepKey {
        DepKey::Name(s.into())
    }

    #[test]
    fn track_outside_a_computation_is_a_no_op() {
        let target = ObjectId::new();
        Runtime::track(target, name("a"));
        assert!(!Runtime::is_tracked(target));
    }

    #[test]
    fn track_records_each_dependency_once() {
        let target = ObjectId::new();
        let computation = MockComputation::new();

        computation.read(target, &[name("a"), name("a"), name("b")]);

        assert_eq!(computation.deps.lock().len(), 2);
        assert_eq!(Runtime::subscriber_count(target, &name("a")), 1);
    }

    #[test]
    fn paused_tracking_records_nothing() {
        let target = ObjectId::new();
        let computation = MockComputation::new();
        {
            let _ctx = ReactiveContext::enter(computation.clone());
            let _pause = ReactiveContext::pause_tracking();
            Runtime::track(target, name("a"));
        }
        assert!(computation.deps.lock().is_empty());
    }

    #[test]
    fn trigger_notifies_key_subscribers() {
        let target = ObjectId::new();
        let reader = MockComputation::new();
        let other = MockComputation::new();
        reader.read(target, &[name("a")]);
        other.read(target, &[name("b")]);

        Runtime::trigger(Target::new(target, false), name("a"), TriggerOp::Set);

        assert_eq!(reader.count(), 1);
        assert_eq!(other.count(), 0);
    }

    #[test]
    fn add_and_delete_notify_iteration() {
        let target = ObjectId::new();
        let iterator = MockComputation::new();
        iterator.read(target, &[DepKey::Iterate]);

        let t = Target::new(target, false);
        Runtime::trigger(t, name("x"), TriggerOp::Set);
        assert_eq!(iterator.count(), 0);

        Runtime::trigger(t, name("x"), TriggerOp::Add);
        Runtime::trigger(t, name("x"), TriggerOp::Delete);
        assert_eq!(iterator.count(), 2);
    }

    #[test]
    fn list_add_notifies_length() {
        let target = ObjectId::new();
        let length_reader = MockComputation::new();
        length_reader.read(target, &[DepKey::Length]);

        Runtime::trigger(Target::new(target, true), DepKey::Index(3), TriggerOp::Add);
        assert_eq!(length_reader.count(), 1);
    }

    #[test]
    fn resize_notifies_truncated_indices() {
        let target = ObjectId::new();
        let low = MockComputation::new();
        let high = MockComputation::new();
        low.read(target, &[DepKey::Index(0)]);
        high.read(target, &[DepKey::Index(5)]);

        Runtime::trigger(
            Target::new(target, true),
            DepKey::Length,
            TriggerOp::Resize { len: 2 },
        );

        assert_eq!(low.count(), 0);
        assert_eq!(high.count(), 1);
    }

    #[test]
    fn presence_readers_wake_on_add_and_delete_only() {
        let target = ObjectId::new();
        let presence = MockComputation::new();
        let value = MockComputation::new();
        presence.read(target, &[name("a").presence()]);
        value.read(target, &[name("a")]);

        let t = Target::new(target, false);
        Runtime::trigger(t, name("a"), TriggerOp::Set);
        assert_eq!(presence.count(), 0);
        assert_eq!(value.count(), 1);

        // An add that leaves the value unchanged reaches presence only.
        Runtime::trigger(t, name("a").presence(), TriggerOp::Add);
        assert_eq!(presence.count(), 1);
        assert_eq!(value.count(), 1);

        Runtime::trigger(t, name("a"), TriggerOp::Delete);
        assert_eq!(presence.count(), 2);
        assert_eq!(value.count(), 2);
    }

    #[test]
    fn resize_notifies_index_presence_readers() {
        let target = ObjectId::new();
        let reader = MockComputation::new();
        reader.read(target, &[DepKey::Index(4).presence()]);

        Runtime::trigger(
            Target::new(target, true),
            DepKey::Length,
            TriggerOp::Resize { len: 1 },
        );
        assert_eq!(reader.count(), 1);
    }

    #[test]
    fn subscribers_are_deduplicated() {
        let target = ObjectId::new();
        let computation = MockComputation::new();
        computation.read(target, &[name("x"), DepKey::Iterate]);

        Runtime::trigger(Target::new(target, false), name("x"), TriggerOp::Add);
        assert_eq!(computation.count(), 1);
    }

    #[test]
    fn running_computation_is_not_retriggered() {
        let target = ObjectId::new();
        let computation = MockComputation::new();
        computation.read(target, &[name("a")]);
        {
            let _ctx = ReactiveContext::enter(computation.clone());
            Runtime::trigger(Target::new(target, false), name("a"), TriggerOp::Set);
        }
        assert_eq!(computation.count(), 0);
    }

    #[test]
    fn cleanup_prunes_empty_sets() {
        let target = ObjectId::new();
        let computation = MockComputation::new();
        computation.read(target, &[name("a")]);
        assert!(Runtime::is_tracked(target));

        let deps = std::mem::take(&mut *computation.deps.lock());
        Runtime::cleanup(computation.id, deps);

        assert!(!Runtime::is_tracked(target));
    }

    #[test]
    fn dropped_computations_are_skipped() {
        let target = ObjectId::new();
        let computation = MockComputation::new();
        computation.read(target, &[name("a")]);
        drop(computation);

        assert_eq!(Runtime::subscriber_count(target, &name("a")), 0);
        Runtime::trigger(Target::new(target, false), name("a"), TriggerOp::Set);
    }
}
