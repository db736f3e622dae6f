//! Data Objects
//!
//! A data object is the caller-owned state a reactive wrapper intercepts.
//! It comes in four shapes: records (ordered named fields with an optional
//! prototype), lists, sets and maps. The runtime never owns the canonical
//! instance. Wrappers and the dependency store refer to it by handle or by
//! [`ObjectId`], and the store forgets an object as soon as its last handle
//! is dropped.
//!
//! The accessors here are raw: they neither track nor trigger.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use super::{Key, ListKey, Value};
use crate::error::{Error, Result};
use crate::reactive::{Runtime, Target};

/// Unique identifier for a data object.
///
/// Memos draw their slot ids from the same counter, so ids never collide
/// inside the dependency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

/// The container shape of a data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Record,
    List,
    Set,
    Map,
}

impl Shape {
    /// Lists are the only indexed shape.
    pub fn is_indexed(self) -> bool {
        self == Shape::List
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Record => "record",
            Shape::List => "list",
            Shape::Set => "set",
            Shape::Map => "map",
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct Record {
    pub(crate) fields: IndexMap<Arc<str>, Value>,
    pub(crate) proto: Option<Object>,
}

#[derive(Debug)]
pub(crate) enum Data {
    Record(Record),
    List(Vec<Value>),
    Set(IndexSet<Value>),
    Map(IndexMap<Value, Value>),
}

impl Data {
    fn empty(shape: Shape) -> Self {
        match shape {
            Shape::Record => Data::Record(Record::default()),
            Shape::List => Data::List(Vec::new()),
            Shape::Set => Data::Set(IndexSet::new()),
            Shape::Map => Data::Map(IndexMap::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Data::Record(record) => record.fields.len(),
            Data::List(items) => items.len(),
            Data::Set(members) => members.len(),
            Data::Map(entries) => entries.len(),
        }
    }
}

struct ObjectInner {
    id: ObjectId,
    shape: Shape,
    data: RwLock<Data>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        Runtime::forget(self.id);
    }
}

/// Shared handle to a data object.
///
/// Cloning the handle shares the object. Equality is identity.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    fn from_data(shape: Shape, data: Data) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                shape,
                data: RwLock::new(data),
            }),
        }
    }

    /// An empty object of the given shape.
    pub fn new(shape: Shape) -> Self {
        Self::from_data(shape, Data::empty(shape))
    }

    /// A record with the given fields, in order.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Arc<str>>,
        V: Into<Value>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into().into_raw()))
            .collect();
        Self::from_data(Shape::Record, Data::Record(Record { fields, proto: None }))
    }

    /// A list with the given items.
    pub fn list<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items = items.into_iter().map(|v| v.into().into_raw()).collect();
        Self::from_data(Shape::List, Data::List(items))
    }

    /// A set with the given members. Duplicates collapse.
    pub fn set<V, I>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let members = members.into_iter().map(|v| v.into().into_raw()).collect();
        Self::from_data(Shape::Set, Data::Set(members))
    }

    /// A map with the given entries. Later duplicates overwrite earlier ones.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into().into_raw(), v.into().into_raw()))
            .collect();
        Self::from_data(Shape::Map, Data::Map(entries))
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of fields, items, members or entries.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw lookup. Records fall back to their prototype chain; sets answer
    /// with the stored member.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let (proto, name) = match &*self.read() {
            Data::Record(record) => {
                let name = key.to_name()?;
                if let Some(value) = record.fields.get(&name) {
                    return Some(value.clone());
                }
                (record.proto.clone()?, name)
            }
            Data::List(items) => {
                return match key.to_list_key()? {
                    ListKey::Index(i) => items.get(i).cloned(),
                    ListKey::Length => Some(Value::from(items.len())),
                }
            }
            Data::Set(members) => return members.get(&key.into_entry()).cloned(),
            Data::Map(entries) => return entries.get(&key.into_entry()).cloned(),
        };
        // Looked up after the read guard is released.
        proto.get(Key::Name(name))
    }

    /// The prototype of a record.
    pub fn prototype(&self) -> Option<Object> {
        match &*self.read() {
            Data::Record(record) => record.proto.clone(),
            _ => None,
        }
    }

    /// Set or clear the prototype of a record. Reads of fields the record
    /// does not own fall through to the prototype.
    ///
    /// Fails with [`Error::CyclicPrototype`] when the record is already on
    /// the chain of `proto`.
    pub fn set_prototype(&self, proto: Option<Object>) -> Result<()> {
        if self.shape() != Shape::Record {
            return Err(self.mismatch(Shape::Record));
        }
        let mut next = proto.clone();
        while let Some(object) = next {
            if object.ptr_eq(self) {
                return Err(Error::CyclicPrototype);
            }
            next = object.prototype();
        }

        let previous = self.with_record_mut(|record| std::mem::replace(&mut record.proto, proto))?;
        drop(previous);
        Ok(())
    }

    pub(crate) fn target(&self) -> Target {
        Target::new(self.id(), self.shape().is_indexed())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Data> {
        self.inner.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Data> {
        self.inner.data.write()
    }

    fn mismatch(&self, expected: Shape) -> Error {
        Error::ShapeMismatch {
            expected,
            found: self.shape(),
        }
    }

    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&Record) -> R) -> Result<R> {
        match &*self.read() {
            Data::Record(record) => Ok(f(record)),
            _ => Err(self.mismatch(Shape::Record)),
        }
    }

    pub(crate) fn with_record_mut<R>(&self, f: impl FnOnce(&mut Record) -> R) -> Result<R> {
        match &mut *self.write() {
            Data::Record(record) => Ok(f(record)),
            _ => Err(self.mismatch(Shape::Record)),
        }
    }

    pub(crate) fn with_list<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> Result<R> {
        match &*self.read() {
            Data::List(items) => Ok(f(items)),
            _ => Err(self.mismatch(Shape::List)),
        }
    }

    pub(crate) fn with_list_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        match &mut *self.write() {
            Data::List(items) => Ok(f(items)),
            _ => Err(self.mismatch(Shape::List)),
        }
    }

    pub(crate) fn with_set<R>(&self, f: impl FnOnce(&IndexSet<Value>) -> R) -> Result<R> {
        match &*self.read() {
            Data::Set(members) => Ok(f(members)),
            _ => Err(self.mismatch(Shape::Set)),
        }
    }

    pub(crate) fn with_set_mut<R>(&self, f: impl FnOnce(&mut IndexSet<Value>) -> R) -> Result<R> {
        match &mut *self.write() {
            Data::Set(members) => Ok(f(members)),
            _ => Err(self.mismatch(Shape::Set)),
        }
    }

    pub(crate) fn with_map<R>(&self, f: impl FnOnce(&IndexMap<Value, Value>) -> R) -> Result<R> {
        match &*self.read() {
            Data::Map(entries) => Ok(f(entries)),
            _ => Err(self.mismatch(Shape::Map)),
        }
    }

    pub(crate) fn with_map_mut<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<Value, Value>) -> R,
    ) -> Result<R> {
        match &mut *self.write() {
            Data::Map(entries) => Ok(f(entries)),
            _ => Err(self.mismatch(Shape::Map)),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id().raw())
            .field("shape", &self.shape())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique() {
        let a = Object::new(Shape::List);
        let b = Object::new(Shape::List);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn constructors_store_raw_values() {
        let inner = Object::record([("x", 1)]);
        let wrapped = crate::proxy::reactive(&inner);
        let list = Object::list([Value::from(wrapped)]);

        let stored = list.get(0usize).unwrap();
        assert!(matches!(stored, Value::Object(ref o) if o.ptr_eq(&inner)));
    }

    #[test]
    fn record_lookup_follows_prototype() {
        let parent = Object::record([("bar", 1)]);
        let child = Object::record([("foo", 2)]);
        child.set_prototype(Some(parent.clone())).unwrap();

        assert_eq!(child.get("foo"), Some(Value::from(2)));
        assert_eq!(child.get("bar"), Some(Value::from(1)));
        assert_eq!(child.get("baz"), None);
        assert_eq!(child.prototype(), Some(parent));
    }

    #[test]
    fn cyclic_prototypes_are_rejected() {
        let a = Object::record([("a", 1)]);
        let b = Object::record([("b", 2)]);
        b.set_prototype(Some(a.clone())).unwrap();

        assert!(matches!(
            a.set_prototype(Some(a.clone())).unwrap_err(),
            Error::CyclicPrototype
        ));
        assert!(matches!(
            a.set_prototype(Some(b.clone())).unwrap_err(),
            Error::CyclicPrototype
        ));

        assert_eq!(a.prototype(), None);
        assert_eq!(b.get("missing"), None);
        assert_eq!(b.get("a"), Some(Value::from(1)));
    }

    #[test]
    fn prototype_is_record_only() {
        let list = Object::new(Shape::List);
        let err = list.set_prototype(None).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { expected: Shape::Record, found: Shape::List }
        ));
    }

    #[test]
    fn set_and_map_lookups() {
        let set = Object::set([1, 2, 2, 3]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(Value::from(2)), Some(Value::from(2)));

        let map = Object::map([("a", 1), ("b", 2)]);
        assert_eq!(map.get("b"), Some(Value::from(2)));
        assert_eq!(map.get("c"), None);
    }

    #[test]
    fn list_length_key() {
        let list = Object::list(["a", "b"]);
        assert_eq!(list.get("length"), Some(Value::from(2usize)));
    }
}
