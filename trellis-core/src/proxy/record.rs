//! Record interception.
//!
//! Records may have a prototype. A read of a field the record does not own
//! continues through the prototype's wrapper, so the reader also depends on
//! the prototype. A write of such a field is delegated the same way, but
//! the field is always defined on the receiving record and only the
//! receiver's wrapper notifies.

use std::sync::Arc;

use super::Reactive;
use crate::error::Result;
use crate::reactive::{DepKey, Runtime, TriggerOp};
use crate::value::{Key, Object, Value};

impl Reactive {
    pub(super) fn record_get(&self, name: Arc<str>) -> Result<Value> {
        Runtime::track(self.id(), DepKey::Name(name.clone()));

        let (own, proto) = self
            .raw()
            .with_record(|record| (record.fields.get(&name).cloned(), record.proto.clone()))?;

        match (own, proto) {
            (Some(value), _) => Ok(self.wrap_child(value)),
            (None, Some(proto)) => self.sibling(&proto).record_get(name),
            (None, None) => Ok(Value::Undefined),
        }
    }

    pub(super) fn record_has(&self, name: Arc<str>) -> Result<bool> {
        Runtime::track(self.id(), DepKey::Name(name.clone()).presence());

        let (own, proto) = self
            .raw()
            .with_record(|record| (record.fields.contains_key(&name), record.proto.clone()))?;

        match (own, proto) {
            (true, _) => Ok(true),
            (false, Some(proto)) => self.sibling(&proto).record_has(name),
            (false, None) => Ok(false),
        }
    }

    /// Write `name` as seen from `receiver`, the record the write was made
    /// on. `receiver` differs from this wrapper's object when the write was
    /// delegated up the prototype chain.
    pub(super) fn record_set(&self, name: Arc<str>, value: Value, receiver: &Object) -> Result<bool> {
        if self.reject_write("set", &name) {
            return Ok(true);
        }
        let value = value.into_raw();

        let (own, proto) = self.raw().with_record(|record| {
            (record.fields.get(&name).cloned(), record.proto.clone())
        })?;
        let is_receiver = self.raw().ptr_eq(receiver);

        match (own, proto) {
            (Some(old), _) => {
                let _replaced = receiver
                    .with_record_mut(|record| record.fields.insert(name.clone(), value.clone()))?;
                if is_receiver && Value::has_changed(&old, &value) {
                    Runtime::trigger(self.target(), DepKey::Name(name), TriggerOp::Set);
                }
            }
            (None, Some(proto)) => {
                let inherited = proto.get(Key::Name(name.clone())).unwrap_or_default();
                self.sibling(&proto)
                    .record_set(name.clone(), value.clone(), receiver)?;
                if is_receiver {
                    self.trigger_add(DepKey::Name(name), &inherited, &value);
                }
            }
            (None, None) => {
                let _replaced = receiver
                    .with_record_mut(|record| record.fields.insert(name.clone(), value.clone()))?;
                if is_receiver {
                    self.trigger_add(DepKey::Name(name), &Value::Undefined, &value);
                }
            }
        }

        Ok(true)
    }

    pub(super) fn record_delete(&self, name: Arc<str>) -> Result<bool> {
        if self.reject_write("delete", &name) {
            return Ok(true);
        }

        let removed = self
            .raw()
            .with_record_mut(|record| record.fields.shift_remove(&name))?;

        if removed.is_some() {
            Runtime::trigger(self.target(), DepKey::Name(name), TriggerOp::Delete);
        }
        Ok(removed.is_some())
    }

    pub(super) fn record_keys(&self) -> Result<Vec<Key>> {
        Runtime::track(self.id(), DepKey::Iterate);
        self.raw()
            .with_record(|record| record.fields.keys().cloned().map(Key::Name).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::proxy::reactive;
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
    fn setting_an_equal_value_does_not_notify() {
        let state = reactive(&Object::record([("n", f64::NAN)]));
        let s = state.clone();
        let (_effect, runs) = counting_effect(move || {
            s.get("n").unwrap();
        });

        state.set("n", f64::NAN).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("n", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adding_a_field_notifies_iteration() {
        let state = reactive(&Object::record([("a", 1)]));
        let s = state.clone();
        let (_effect, runs) = counting_effect(move || {
            s.keys().unwrap();
        });

        state.set("a", 2).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("b", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        assert!(state.delete("b").unwrap());
        assert!(!state.delete("b").unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn has_tracks_missing_keys() {
        let state = reactive(&Object::record([("a", 1)]));
        let s = state.clone();
        let (_effect, runs) = counting_effect(move || {
            s.has("b").unwrap();
        });

        state.set("b", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reads_fall_through_to_the_prototype() {
        let parent = Object::record([("bar", 1)]);
        let child = Object::record([("foo", 1)]);
        child.set_prototype(Some(parent.clone())).unwrap();

        let obj = reactive(&child);
        let o = obj.clone();
        let (_effect, runs) = counting_effect(move || {
            o.get("bar").unwrap();
        });

        reactive(&parent).set("bar", 2).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(obj.get("bar").unwrap(), Value::from(2));
    }

    #[test]
    fn adding_an_equal_value_does_not_notify_readers() {
        let parent = Object::record([("bar", 1)]);
        let child = Object::record([("foo", 1)]);
        child.set_prototype(Some(parent.clone())).unwrap();

        let obj = reactive(&child);
        let (o, p) = (obj.clone(), obj.clone());
        let (_bar, bar_runs) = counting_effect(move || {
            o.get("bar").unwrap();
        });
        let (_missing, missing_runs) = counting_effect(move || {
            p.get("missing").unwrap();
        });

        obj.set("bar", 1).unwrap();
        obj.set("missing", Value::Undefined).unwrap();

        assert_eq!(bar_runs.load(Ordering::SeqCst), 1);
        assert_eq!(missing_runs.load(Ordering::SeqCst), 1);
        assert_eq!(child.get("missing"), Some(Value::Undefined));
    }

    #[test]
    fn adding_an_equal_value_still_notifies_presence_and_iteration() {
        let state = reactive(&Object::record([("a", 1)]));
        let (s, t) = (state.clone(), state.clone());
        let (_has, has_runs) = counting_effect(move || {
            s.has("missing").unwrap();
        });
        let (_keys, keys_runs) = counting_effect(move || {
            t.keys().unwrap();
        });

        state.set("missing", Value::Undefined).unwrap();

        assert_eq!(has_runs.load(Ordering::SeqCst), 2);
        assert_eq!(keys_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn inherited_write_defines_on_receiver_and_notifies_once() {
        let parent = Object::record([("bar", 1)]);
        let child = Object::record([("foo", 1)]);
        child.set_prototype(Some(parent.clone())).unwrap();

        let obj = reactive(&child);
        let o = obj.clone();
        let (_effect, runs) = counting_effect(move || {
            o.get("bar").unwrap();
        });

        obj.set("bar", 2).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(child.get("bar"), Some(Value::from(2)));
        assert_eq!(parent.get("bar"), Some(Value::from(1)));
    }
}
