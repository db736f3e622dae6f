//! Dynamic Values
//!
//! Reactive state is made of plain, caller-owned data objects holding
//! dynamically typed values. This module defines those values, the keys
//! used to address them, and the hashable form of a value used when it
//! keys a set member or a map entry.
//!
//! # Equality
//!
//! `Value` equality is a NaN-safe "same value zero" test: two NaNs are
//! equal, `0.0 == -0.0`, and objects and wrappers compare by identity. Every
//! write path uses [`Value::has_changed`], the negation of that test, to
//! decide whether dependents must be notified. Assigning NaN over NaN is
//! therefore never a change.

mod json;
mod object;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub use object::{Object, ObjectId, Shape};
pub(crate) use object::{Data, Record};

use crate::proxy::Reactive;

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// An absent value: missing keys, list holes.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// A raw data object. Raw containers only ever hold this variant.
    Object(Object),
    /// A reactive wrapper, as returned by reads through a deep wrapper.
    Reactive(Reactive),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Reactive(_) => "reactive",
        }
    }

    /// Whether two values differ for change-notification purposes.
    pub fn has_changed(old: &Value, new: &Value) -> bool {
        old != new
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Whether this value is an object, raw or wrapped.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    /// The underlying data object, looking through a wrapper.
    pub fn raw_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            Value::Reactive(r) => Some(r.raw()),
            _ => None,
        }
    }

    /// Strip a wrapper so the value can be stored in a raw container.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Reactive(r) => Value::Object(r.raw().clone()),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        EntryKey::from(self).hash(state);
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Reactive(r)
    }
}

/// Hashable identity of a value.
///
/// Objects are reduced to their id so that a dependency keyed on an object
/// entry never keeps that object alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Arc<str>),
    Object(ObjectId),
}

impl From<&Value> for EntryKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Undefined => EntryKey::Undefined,
            Value::Null => EntryKey::Null,
            Value::Bool(b) => EntryKey::Bool(*b),
            Value::Number(n) => EntryKey::Number(number_bits(*n)),
            Value::Str(s) => EntryKey::Str(s.clone()),
            Value::Object(o) => EntryKey::Object(o.id()),
            Value::Reactive(r) => EntryKey::Object(r.raw().id()),
        }
    }
}

// NaN and -0.0 hash like their canonical counterparts.
fn number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

/// Largest list length. Valid indices are below it.
pub(crate) const MAX_LIST_LEN: usize = u32::MAX as usize;

pub(crate) fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

/// A property key: a record field name, a list index, or a set/map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(Arc<str>),
    Index(usize),
    Entry(Value),
}

/// How a key addresses a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKey {
    Index(usize),
    Length,
}

impl Key {
    /// The record field this key names. Indices and numbers are coerced to
    /// their decimal spelling.
    pub(crate) fn to_name(&self) -> Option<Arc<str>> {
        match self {
            Key::Name(name) => Some(name.clone()),
            Key::Index(i) => Some(i.to_string().into()),
            Key::Entry(Value::Str(s)) => Some(s.clone()),
            Key::Entry(Value::Number(n)) => Some(match as_index(*n) {
                Some(i) => i.to_string().into(),
                None => n.to_string().into(),
            }),
            Key::Entry(_) => None,
        }
    }

    /// The list index or length this key addresses. Indices at or past
    /// [`MAX_LIST_LEN`] address nothing.
    pub(crate) fn to_list_key(&self) -> Option<ListKey> {
        let key = match self {
            Key::Index(i) => ListKey::Index(*i),
            Key::Name(name) if &**name == "length" => ListKey::Length,
            Key::Name(name) => ListKey::Index(name.parse().ok()?),
            Key::Entry(Value::Number(n)) => ListKey::Index(as_index(*n)?),
            Key::Entry(Value::Str(s)) => return Key::Name(s.clone()).to_list_key(),
            Key::Entry(_) => return None,
        };
        match key {
            ListKey::Index(i) if i >= MAX_LIST_LEN => None,
            key => Some(key),
        }
    }

    /// The raw value this key denotes as a set member or map key.
    pub(crate) fn into_entry(self) -> Value {
        match self {
            Key::Name(name) => Value::Str(name),
            Key::Index(i) => Value::from(i),
            Key::Entry(value) => value.into_raw(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name.into())
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Entry(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
            Key::Entry(Value::Str(s)) => write!(f, "{s:?}"),
            Key::Entry(Value::Number(n)) => write!(f, "{n}"),
            Key::Entry(other) => write!(f, "<{}>", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn nan_is_not_a_change() {
        let nan = Value::Number(f64::NAN);
        assert!(!Value::has_changed(&nan, &Value::Number(f64::NAN)));
        assert!(Value::has_changed(&nan, &Value::from(1)));
        assert_eq!(hash_of(&nan), hash_of(&Value::Number(f64::NAN)));
    }

    #[test]
    fn signed_zeroes_are_equal() {
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(hash_of(&Value::Number(0.0)), hash_of(&Value::Number(-0.0)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Object::new(Shape::Record);
        let b = Object::new(Shape::Record);
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn keys_normalize_per_shape() {
        assert_eq!(Key::from(3usize).to_name().as_deref(), Some("3"));
        assert_eq!(Key::from("length").to_list_key(), Some(ListKey::Length));
        assert_eq!(Key::from("2").to_list_key(), Some(ListKey::Index(2)));
        assert_eq!(Key::from(Value::from(1.5)).to_list_key(), None);
        assert_eq!(Key::from(usize::MAX).to_list_key(), None);
        assert_eq!(Key::from(Value::from(4294967295.0)).to_list_key(), None);
        assert_eq!(
            Key::from(Value::from(4294967294.0)).to_list_key(),
            Some(ListKey::Index(MAX_LIST_LEN - 1))
        );
        assert_eq!(Key::from("a").into_entry(), Value::from("a"));
    }

    #[test]
    fn into_raw_strips_wrappers() {
        let obj = Object::new(Shape::Record);
        let wrapped = Value::from(crate::proxy::reactive(&obj));
        assert_eq!(wrapped.clone().into_raw(), Value::Object(obj.clone()));
        assert_eq!(wrapped.raw_object().map(Object::id), Some(obj.id()));
    }
}
