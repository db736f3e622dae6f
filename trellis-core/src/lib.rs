//! Trellis Core
//!
//! This crate provides a fine-grained reactive runtime. Computations read
//! plain data through reactive wrappers, the runtime records exactly what
//! each computation read, and a write re-runs exactly the computations that
//! read what was written.
//!
//! It implements:
//!
//! - Data objects (records, lists, sets, maps) holding dynamic values
//! - Reactive wrappers, deep or shallow, writable or read-only
//! - Effects, memos and watchers
//! - A deduplicating job queue for deferred work
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: dynamic values, keys and the data objects they live in
//! - `proxy`: reactive wrappers that track reads and trigger on writes
//! - `reactive`: the dependency store, effects, memos, watchers, job queue
//! - `config`: process-wide runtime settings
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{derive, effect, reactive, Object};
//!
//! // Wrap some state
//! let state = reactive(&Object::record([("count", 0)]));
//!
//! // Create a derived value
//! let s = state.clone();
//! let doubled = derive(move || s.get("count").unwrap().as_number().unwrap() * 2.0);
//!
//! // Create an effect
//! let d = doubled.clone();
//! let _effect = effect(move || println!("Doubled: {}", d.get()));
//!
//! // Update the state
//! state.set("count", 5)?;
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod proxy;
pub mod reactive;
pub mod value;

pub use config::{config, configure, RuntimeConfig};
pub use error::{Error, Result};
pub use proxy::{reactive, readonly, shallow_reactive, shallow_readonly, wrap, Reactive, WrapOptions};
pub use reactive::{
    batch, derive, effect, effect_with, flush_jobs, queue_job, watch, Effect, EffectOptions, Flush,
    Job, Memo, OnCleanup, WatchOptions, WatchSource, Watcher,
};
pub use value::{EntryKey, Key, Object, ObjectId, Shape, Value};
