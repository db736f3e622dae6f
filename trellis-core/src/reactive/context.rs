//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! Reads made while a computation is active subscribe it to what they read.
//!
//! # Implementation
//!
//! Each thread keeps a stack of running computations. Running a computation
//! pushes it and the returned guard pops it again, including when the
//! computation panics, so the stack is always restored to its pre-call
//! state. Nested computations, such as a memo read inside an effect, simply
//! stack.
//!
//! Next to the stack lives the should-track flag. List mutations like `push`
//! clear it for the duration of their internal reads and writes. Entering a
//! computation always sets it again (and leaving restores it), so an effect
//! that runs synchronously in the middle of a paused mutation still tracks
//! its own reads.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::runtime::Computation;
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
}

struct ContextEntry {
    computation: Arc<dyn Computation>,
    /// Should-track flag to restore when this entry is popped.
    saved_should_track: bool,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Make `computation` the active computation until the guard drops.
    pub(crate) fn enter(computation: Arc<dyn Computation>) -> Self {
        let subscriber_id = computation.subscriber_id();
        let saved_should_track = SHOULD_TRACK.with(|flag| flag.replace(true));
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                computation,
                saved_should_track,
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Number of computations currently on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.computation.subscriber_id())
        })
    }

    pub(crate) fn current() -> Option<Arc<dyn Computation>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.computation.clone()))
    }

    /// Whether reads are currently recorded.
    pub fn should_track() -> bool {
        SHOULD_TRACK.with(Cell::get)
    }

    /// Stop recording reads until the returned guard drops.
    pub fn pause_tracking() -> TrackingPause {
        TrackingPause {
            previous: SHOULD_TRACK.with(|flag| flag.replace(false)),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Let the popped computation drop after the stack borrow ends.
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(entry) = popped {
            SHOULD_TRACK.with(|flag| flag.set(entry.saved_should_track));
            debug_assert_eq!(
                entry.computation.subscriber_id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                entry.computation.subscriber_id()
            );
        }
    }
}

/// Guard returned by [`ReactiveContext::pause_tracking`].
pub struct TrackingPause {
    previous: bool,
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        SHOULD_TRACK.with(|flag| flag.set(self.previous));
    }
}

/// Run `f` without recording any of its reads.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _pause = ReactiveContext::pause_tracking();
    f()
}
