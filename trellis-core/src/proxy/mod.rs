//! Reactive Wrappers
//!
//! A [`Reactive`] wraps one data object. Reads through it subscribe the
//! running computation to what was read, and writes through it notify the
//! computations that read what was written. The wrapped object stays the
//! single source of truth: wrappers hold no state of their own.
//!
//! # Canonical wrappers
//!
//! There is at most one live wrapper per object and option set. Wrapping
//! the same object twice with the same options returns the same wrapper
//! (same identity), as long as a handle to the first one is still alive.
//!
//! # Deep and shallow
//!
//! A deep wrapper returns nested objects wrapped with its own options, so a
//! whole tree of data becomes reactive lazily, one level per read. A shallow
//! wrapper returns nested objects raw.
//!
//! # Read-only
//!
//! A read-only wrapper tracks reads like any other, but ignores writes. An
//! ignored write is logged at warn level and still reports success.

mod collection;
mod list;
mod record;

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::config;
use crate::error::{Error, Result};
use crate::reactive::{DepKey, Runtime, Target, TriggerOp};
use crate::value::{as_index, Key, ListKey, Object, ObjectId, Shape, Value};

/// How a wrapper intercepts its object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapOptions {
    /// Return nested objects raw instead of wrapped.
    pub shallow: bool,
    /// Ignore writes.
    pub readonly: bool,
}

impl WrapOptions {
    pub const REACTIVE: Self = Self {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW: Self = Self {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: Self = Self {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: Self = Self {
        shallow: true,
        readonly: true,
    };
}

type CacheKey = (ObjectId, WrapOptions);

struct ProxyInner {
    raw: Object,
    options: WrapOptions,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        // A replacement wrapper may already be cached under this key.
        get_cache().remove_if(&(self.raw.id(), self.options), |_, weak| {
            weak.strong_count() == 0
        });
    }
}

static CACHE: OnceLock<DashMap<CacheKey, Weak<ProxyInner>>> = OnceLock::new();

fn get_cache() -> &'static DashMap<CacheKey, Weak<ProxyInner>> {
    CACHE.get_or_init(DashMap::new)
}

/// A reactive wrapper over a data object.
///
/// Cloning shares the wrapper. Equality is identity.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ProxyInner>,
}

fn wrap_object(raw: &Object, options: WrapOptions) -> Reactive {
    let create = || {
        Arc::new(ProxyInner {
            raw: raw.clone(),
            options,
        })
    };

    let inner = match get_cache().entry((raw.id(), options)) {
        Entry::Occupied(mut cached) => match cached.get().upgrade() {
            Some(inner) => inner,
            None => {
                let inner = create();
                cached.insert(Arc::downgrade(&inner));
                inner
            }
        },
        Entry::Vacant(slot) => {
            let inner = create();
            slot.insert(Arc::downgrade(&inner));
            inner
        }
    };

    Reactive { inner }
}

/// Get the canonical wrapper of `value` for `options`.
///
/// Wrapping a wrapper never nests: with equal options the wrapper itself is
/// returned, otherwise its object is wrapped anew.
pub fn wrap(value: impl Into<Value>, options: WrapOptions) -> Result<Reactive> {
    match value.into() {
        Value::Object(object) => Ok(wrap_object(&object, options)),
        Value::Reactive(existing) if existing.options() == options => Ok(existing),
        Value::Reactive(existing) => Ok(wrap_object(existing.raw(), options)),
        other => Err(Error::NotAnObject { kind: other.kind() }),
    }
}

/// Deep, writable wrapper.
pub fn reactive(object: &Object) -> Reactive {
    wrap_object(object, WrapOptions::REACTIVE)
}

/// Shallow, writable wrapper.
pub fn shallow_reactive(object: &Object) -> Reactive {
    wrap_object(object, WrapOptions::SHALLOW)
}

/// Deep, read-only wrapper.
pub fn readonly(object: &Object) -> Reactive {
    wrap_object(object, WrapOptions::READONLY)
}

pub fn shallow_readonly(object: &Object) -> Reactive {
    wrap_object(object, WrapOptions::SHALLOW_READONLY)
}

impl Reactive {
    /// The wrapped data object.
    pub fn raw(&self) -> &Object {
        &self.inner.raw
    }

    pub fn options(&self) -> WrapOptions {
        self.inner.options
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.options.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.options.shallow
    }

    pub fn shape(&self) -> Shape {
        self.inner.raw.shape()
    }

    /// Snapshot the wrapped object as JSON without tracking.
    pub fn to_json(&self) -> serde_json::Value {
        self.inner.raw.to_json()
    }

    pub(crate) fn target(&self) -> Target {
        self.inner.raw.target()
    }

    fn id(&self) -> ObjectId {
        self.inner.raw.id()
    }

    /// Wrap an object read out of this wrapper, unless shallow.
    fn wrap_child(&self, value: Value) -> Value {
        match value {
            Value::Object(object) if !self.is_shallow() => {
                Value::Reactive(wrap_object(&object, self.options()))
            }
            other => other,
        }
    }

    /// Wrapper over `object` with the same options as this one.
    fn sibling(&self, object: &Object) -> Reactive {
        wrap_object(object, self.options())
    }

    /// Returns true when the write must be dropped.
    fn reject_write(&self, op: &'static str, key: &dyn fmt::Display) -> bool {
        if !self.is_readonly() {
            return false;
        }
        if config().warn_on_readonly_write {
            tracing::warn!(
                op,
                key = %key,
                object = self.id().raw(),
                "write ignored, object is read-only"
            );
        }
        true
    }

    /// Notify that `key` became present. Value readers are only notified
    /// when the value read at `key` actually changed from `old`.
    fn trigger_add(&self, key: DepKey, old: &Value, new: &Value) {
        let key = if Value::has_changed(old, new) {
            key
        } else {
            key.presence()
        };
        Runtime::trigger(self.target(), key, TriggerOp::Add);
    }

    fn unsupported(&self, op: &'static str) -> Error {
        Error::Unsupported {
            op,
            shape: self.shape(),
        }
    }

    fn require(&self, shape: Shape, op: &'static str) -> Result<()> {
        if self.shape() == shape {
            Ok(())
        } else {
            Err(self.unsupported(op))
        }
    }

    fn invalid_key(&self, key: &Key) -> Error {
        Error::InvalidKey {
            key: key.to_string(),
            shape: self.shape(),
        }
    }

    fn field_name(&self, key: &Key) -> Result<Arc<str>> {
        key.to_name().ok_or_else(|| self.invalid_key(key))
    }

    fn list_key(&self, key: &Key) -> Result<ListKey> {
        key.to_list_key().ok_or_else(|| self.invalid_key(key))
    }

    /// Read `key`.
    ///
    /// Missing keys read as `Undefined`. On a list, `"length"` reads the
    /// length.
    pub fn get(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        match self.shape() {
            Shape::Record => self.record_get(self.field_name(&key)?),
            Shape::List => match self.list_key(&key)? {
                ListKey::Index(index) => self.list_get(index),
                ListKey::Length => Ok(Value::from(self.len())),
            },
            Shape::Map => self.map_get(key.into_entry()),
            Shape::Set => Err(self.unsupported("get")),
        }
    }

    /// Write `value` at `key`. Returns whether the write succeeded, which
    /// it always does unless it errors.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        let value = value.into();
        match self.shape() {
            Shape::Record => self.record_set(self.field_name(&key)?, value, self.raw()),
            Shape::List => match self.list_key(&key)? {
                ListKey::Index(index) => self.list_set(index, value),
                ListKey::Length => {
                    let len = value.as_number().and_then(as_index).ok_or_else(|| {
                        Error::InvalidLength {
                            value: format!("{value:?}"),
                        }
                    })?;
                    self.set_len(len)
                }
            },
            Shape::Map => self.map_set(key.into_entry(), value),
            Shape::Set => Err(self.unsupported("set")),
        }
    }

    /// Read `key`, then write `f(value)` back.
    pub fn update(&self, key: impl Into<Key>, f: impl FnOnce(Value) -> Value) -> Result<bool> {
        let key = key.into();
        let current = self.get(key.clone())?;
        self.set(key, f(current))
    }

    /// Whether `key` is present. Records also look at their prototype.
    pub fn has(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        match self.shape() {
            Shape::Record => self.record_has(self.field_name(&key)?),
            Shape::List => match self.list_key(&key)? {
                ListKey::Index(index) => self.list_has(index),
                ListKey::Length => Ok(true),
            },
            Shape::Set | Shape::Map => self.collection_has(key.into_entry()),
        }
    }

    /// Remove `key`. Returns whether something was removed.
    ///
    /// Deleting a list index leaves an `Undefined` hole.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        match self.shape() {
            Shape::Record => self.record_delete(self.field_name(&key)?),
            Shape::List => match self.list_key(&key)? {
                ListKey::Index(index) => self.list_delete(index),
                ListKey::Length => Ok(false),
            },
            Shape::Set | Shape::Map => self.collection_delete(key.into_entry()),
        }
    }

    /// Number of fields, items, members or entries.
    pub fn len(&self) -> usize {
        let key = if self.shape().is_indexed() {
            DepKey::Length
        } else {
            DepKey::Iterate
        };
        Runtime::track(self.id(), key);
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field names, indices, or map keys, in order.
    pub fn keys(&self) -> Result<Vec<Key>> {
        match self.shape() {
            Shape::Record => self.record_keys(),
            Shape::List => Ok((0..self.len()).map(Key::Index).collect()),
            Shape::Map => self.map_keys(),
            Shape::Set => Err(self.unsupported("keys")),
        }
    }

    /// Values in order. Each value is read with [`get`](Self::get), so it
    /// is tracked individually.
    pub fn values(&self) -> Result<Vec<Value>> {
        match self.shape() {
            Shape::Set => self.set_values(),
            _ => self
                .keys()?
                .into_iter()
                .map(|key| self.get(key))
                .collect(),
        }
    }

    /// `(key, value)` pairs in order. Set members pair with themselves.
    pub fn entries(&self) -> Result<Vec<(Key, Value)>> {
        match self.shape() {
            Shape::Set => Ok(self
                .set_values()?
                .into_iter()
                .map(|member| (Key::Entry(member.clone()), member))
                .collect()),
            _ => self
                .keys()?
                .into_iter()
                .map(|key| {
                    let value = self.get(key.clone())?;
                    Ok((key, value))
                })
                .collect(),
        }
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("object", &self.id().raw())
            .field("shape", &self.shape())
            .field("shallow", &self.is_shallow())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
