//! Reactive Core
//!
//! This module implements dependency tracking and everything built on it:
//! effects, memos, watchers and the job queue. The interception layer in
//! [`crate::proxy`] feeds it reads and writes.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An Effect is a tracked computation. Every read it makes through a
//! reactive wrapper or a memo subscribes it, and every write to something
//! it read runs it again (or hands it to its scheduler).
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only on
//! a read after one of its dependencies changed. Reading a memo is itself
//! tracked, so memos compose with effects and with each other.
//!
//! ## Watchers
//!
//! A Watcher calls back with the new and previous value of a source when the
//! source changes, synchronously or deferred to the job queue.
//!
//! # Implementation Notes
//!
//! Tracking uses a thread-local context: running a computation pushes it,
//! and reads consult the top of the stack. The dependency store itself is
//! process-wide and keyed by object id, holding subscribers weakly.

mod context;
mod effect;
mod memo;
mod runtime;
mod scheduler;
mod subscriber;
mod watch;

pub use context::{untrack, ReactiveContext, TrackingPause};
pub use effect::{effect, effect_with, Effect, EffectOptions, Scheduler};
pub use memo::{derive, Memo};
pub use runtime::{DepKey, Runtime, Target, TriggerOp};
pub use scheduler::{batch, flush_jobs, is_batching, pending_jobs, queue_job, Job};
pub use subscriber::SubscriberId;
pub use watch::{watch, Flush, OnCleanup, WatchOptions, WatchSource, Watcher};
