//! Set and map interception.
//!
//! Members and entries are tracked by their key. Size and iteration track
//! `Iterate`, which every addition and removal notifies. Keys and values are
//! unwrapped before they are stored, so the raw collection never holds a
//! wrapper.

use super::Reactive;
use crate::error::Result;
use crate::reactive::{DepKey, Runtime, TriggerOp};
use crate::value::{EntryKey, Key, Shape, Value};

fn entry_key(value: &Value) -> DepKey {
    DepKey::Entry(EntryKey::from(value))
}

impl Reactive {
    pub(super) fn map_get(&self, key: Value) -> Result<Value> {
        Runtime::track(self.id(), entry_key(&key));
        let value = self
            .raw()
            .with_map(|entries| entries.get(&key).cloned().unwrap_or_default())?;
        Ok(self.wrap_child(value))
    }

    pub(super) fn map_set(&self, key: Value, value: Value) -> Result<bool> {
        if self.reject_write("set", &Key::Entry(key.clone())) {
            return Ok(true);
        }
        let value = value.into_raw();

        let old = self
            .raw()
            .with_map_mut(|entries| entries.insert(key.clone(), value.clone()))?;

        match old {
            None => self.trigger_add(entry_key(&key), &Value::Undefined, &value),
            Some(old) if Value::has_changed(&old, &value) => {
                Runtime::trigger(self.target(), entry_key(&key), TriggerOp::Set)
            }
            Some(_) => {}
        }
        Ok(true)
    }

    pub(super) fn map_keys(&self) -> Result<Vec<Key>> {
        Runtime::track(self.id(), DepKey::Iterate);
        let keys = self
            .raw()
            .with_map(|entries| entries.keys().cloned().collect::<Vec<_>>())?;
        Ok(keys
            .into_iter()
            .map(|key| Key::Entry(self.wrap_child(key)))
            .collect())
    }

    pub(super) fn set_values(&self) -> Result<Vec<Value>> {
        Runtime::track(self.id(), DepKey::Iterate);
        let members = self
            .raw()
            .with_set(|members| members.iter().cloned().collect::<Vec<_>>())?;
        Ok(members
            .into_iter()
            .map(|member| self.wrap_child(member))
            .collect())
    }

    pub(super) fn collection_has(&self, key: Value) -> Result<bool> {
        Runtime::track(self.id(), entry_key(&key).presence());
        match self.shape() {
            Shape::Set => self.raw().with_set(|members| members.contains(&key)),
            _ => self.raw().with_map(|entries| entries.contains_key(&key)),
        }
    }

    pub(super) fn collection_delete(&self, key: Value) -> Result<bool> {
        if self.reject_write("delete", &Key::Entry(key.clone())) {
            return Ok(true);
        }

        let removed = match self.shape() {
            Shape::Set => self
                .raw()
                .with_set_mut(|members| members.shift_take(&key))?,
            _ => self
                .raw()
                .with_map_mut(|entries| entries.shift_remove_entry(&key))?
                .map(|(key, _)| key),
        };

        if removed.is_some() {
            Runtime::trigger(self.target(), entry_key(&key), TriggerOp::Delete);
        }
        Ok(removed.is_some())
    }

    /// Add `member` to a set. Adding a present member notifies nothing.
    pub fn add(&self, member: impl Into<Value>) -> Result<bool> {
        self.require(Shape::Set, "add")?;
        let member = member.into().into_raw();
        if self.reject_write("add", &Key::Entry(member.clone())) {
            return Ok(true);
        }

        let added = self
            .raw()
            .with_set_mut(|members| members.insert(member.clone()))?;
        if added {
            Runtime::trigger(self.target(), entry_key(&member), TriggerOp::Add);
        }
        Ok(true)
    }

    /// Remove every member or entry of a set or map.
    pub fn clear(&self) -> Result<bool> {
        let removed = match self.shape() {
            Shape::Set | Shape::Map if self.reject_write("clear", &"*") => return Ok(true),
            Shape::Set => self.raw().with_set_mut(std::mem::take)?.len(),
            Shape::Map => self.raw().with_map_mut(std::mem::take)?.len(),
            _ => return Err(self.unsupported("clear")),
        };

        if removed > 0 {
            Runtime::trigger(self.target(), DepKey::Iterate, TriggerOp::Clear);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::proxy::{reactive, readonly};
    use crate::reactive::Effect;
    use crate::value::{Object, Value};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting_effect(run: impl Fn() + Send + Sync + 'static) -> (Effect<()>, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let counter = runs.clone();
        let effect = Effect::new(move || {
            run();
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (effect, runs)
    }

    #[test]
    fn map_set_distinguishes_add_from_set() {
        let map = reactive(&Object::map([("a", 1)]));
        let (m, n) = (map.clone(), map.clone());
        let (_size, size_runs) = counting_effect(move || {
            m.len();
        });
        let (_entry, entry_runs) = counting_effect(move || {
            n.get("a").unwrap();
        });

        map.set("a", 1).unwrap();
        assert_eq!(entry_runs.load(Ordering::SeqCst), 1);

        map.set("a", 2).unwrap();
        assert_eq!(entry_runs.load(Ordering::SeqCst), 2);
        assert_eq!(size_runs.load(Ordering::SeqCst), 1);

        map.set("b", 3).unwrap();
        assert_eq!(size_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adding_an_undefined_entry_notifies_presence_only() {
        let map = reactive(&Object::map([("a", 1)]));
        let (m, n, o) = (map.clone(), map.clone(), map.clone());
        let (_entry, entry_runs) = counting_effect(move || {
            m.get("b").unwrap();
        });
        let (_has, has_runs) = counting_effect(move || {
            n.has("b").unwrap();
        });
        let (_size, size_runs) = counting_effect(move || {
            o.len();
        });

        map.set("b", Value::Undefined).unwrap();

        assert_eq!(entry_runs.load(Ordering::SeqCst), 1);
        assert_eq!(has_runs.load(Ordering::SeqCst), 2);
        assert_eq!(size_runs.load(Ordering::SeqCst), 2);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn set_add_and_delete() {
        let set = reactive(&Object::set([1]));
        let (s, t) = (set.clone(), set.clone());
        let (_size, size_runs) = counting_effect(move || {
            s.len();
        });
        let (_member, member_runs) = counting_effect(move || {
            t.has(Value::from(2)).unwrap();
        });

        set.add(1).unwrap();
        assert_eq!(size_runs.load(Ordering::SeqCst), 1);

        set.add(2).unwrap();
        assert_eq!(size_runs.load(Ordering::SeqCst), 2);
        assert_eq!(member_runs.load(Ordering::SeqCst), 2);

        assert!(set.delete(Value::from(2)).unwrap());
        assert!(!set.delete(Value::from(2)).unwrap());
        assert_eq!(size_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stored_keys_and_values_are_raw() {
        let key = Object::record([("k", 1)]);
        let value = Object::record([("v", 1)]);
        let map = reactive(&Object::map(Vec::<(Value, Value)>::new()));

        map.set(Value::from(reactive(&key)), reactive(&value)).unwrap();

        let stored = map.raw().get(Value::from(key.clone())).unwrap();
        assert!(matches!(stored, Value::Object(ref o) if o.ptr_eq(&value)));

        let read = map.get(Value::from(key)).unwrap();
        assert!(matches!(read, Value::Reactive(ref r) if r.raw().ptr_eq(&value)));
    }

    #[test]
    fn map_values_track_each_entry() {
        let map = reactive(&Object::map([("a", 1), ("b", 2)]));
        let m = map.clone();
        let (_effect, runs) = counting_effect(move || {
            m.values().unwrap();
        });

        map.set("b", 5).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_notifies_every_reader_once() {
        let map = reactive(&Object::map([("a", 1), ("b", 2)]));
        let m = map.clone();
        let (_effect, runs) = counting_effect(move || {
            m.get("a").unwrap();
            m.get("b").unwrap();
        });

        map.clear().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(map.len(), 0);

        map.clear().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_collections_ignore_writes() {
        let raw = Object::set([1]);
        let set = readonly(&raw);
        assert!(set.add(2).unwrap());
        assert!(set.clear().unwrap());
        assert_eq!(raw.len(), 1);
    }
}
