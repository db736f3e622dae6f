//! List interception.
//!
//! Index reads track the index, and length reads track `Length`. Writing
//! past the end adds an item, which notifies length readers. Assigning a
//! shorter length notifies readers of every index cut off.
//!
//! The size-changing methods (`push`, `pop`, `shift`, `unshift`, `splice`)
//! are expressed through index writes and `set_len` with tracking paused.
//! They notify exactly what the equivalent writes notify. They also never
//! subscribe the caller to the length they read internally, so an effect
//! that pushes onto a list does not re-trigger itself.

use super::Reactive;
use crate::error::{Error, Result};
use crate::reactive::{DepKey, ReactiveContext, Runtime, TriggerOp};
use crate::value::{Key, Shape, Value, MAX_LIST_LEN};

// Pad `items` with holes up to `len`, failing instead of aborting when the
// allocation cannot be made.
fn grow(items: &mut Vec<Value>, len: usize) -> Result<()> {
    items
        .try_reserve(len - items.len())
        .map_err(|_| Error::InvalidLength {
            value: len.to_string(),
        })?;
    items.resize(len, Value::Undefined);
    Ok(())
}

impl Reactive {
    pub(super) fn list_get(&self, index: usize) -> Result<Value> {
        Runtime::track(self.id(), DepKey::Index(index));
        let value = self
            .raw()
            .with_list(|items| items.get(index).cloned().unwrap_or_default())?;
        Ok(self.wrap_child(value))
    }

    pub(super) fn list_has(&self, index: usize) -> Result<bool> {
        Runtime::track(self.id(), DepKey::Index(index).presence());
        self.raw().with_list(|items| index < items.len())
    }

    pub(super) fn list_set(&self, index: usize, value: Value) -> Result<bool> {
        if index >= MAX_LIST_LEN {
            return Err(self.invalid_key(&Key::Index(index)));
        }
        if self.reject_write("set", &index) {
            return Ok(true);
        }
        let value = value.into_raw();

        let (old, op) = self.raw().with_list_mut(|items| {
            let op = if index < items.len() {
                TriggerOp::Set
            } else {
                grow(items, index + 1)?;
                TriggerOp::Add
            };
            Ok::<_, Error>((std::mem::replace(&mut items[index], value.clone()), op))
        })??;

        match op {
            TriggerOp::Add => self.trigger_add(DepKey::Index(index), &old, &value),
            _ if Value::has_changed(&old, &value) => {
                Runtime::trigger(self.target(), DepKey::Index(index), op)
            }
            _ => {}
        }
        Ok(true)
    }

    pub(super) fn list_delete(&self, index: usize) -> Result<bool> {
        if self.reject_write("delete", &index) {
            return Ok(true);
        }

        let removed = self
            .raw()
            .with_list_mut(|items| items.get_mut(index).map(std::mem::take))?;

        if removed.is_some() {
            Runtime::trigger(self.target(), DepKey::Index(index), TriggerOp::Delete);
        }
        Ok(removed.is_some())
    }

    fn item_untracked(&self, index: usize) -> Result<Value> {
        self.raw()
            .with_list(|items| items.get(index).cloned().unwrap_or_default())
    }

    /// Truncate or pad the list to `len` items.
    pub fn set_len(&self, len: usize) -> Result<bool> {
        self.require(Shape::List, "set_len")?;
        if len > MAX_LIST_LEN {
            return Err(Error::InvalidLength {
                value: len.to_string(),
            });
        }
        if self.reject_write("set", &"length") {
            return Ok(true);
        }

        let (old_len, _removed) = self.raw().with_list_mut(|items| {
            let old_len = items.len();
            let removed = if len < old_len {
                items.split_off(len)
            } else {
                grow(items, len)?;
                Vec::new()
            };
            Ok::<_, Error>((old_len, removed))
        })??;

        if old_len != len {
            Runtime::trigger(self.target(), DepKey::Length, TriggerOp::Resize { len });
        }
        Ok(true)
    }

    /// Append `items`. Returns the new length.
    pub fn push<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require(Shape::List, "push")?;
        let _pause = ReactiveContext::pause_tracking();

        for item in items {
            let len = self.raw().len();
            self.list_set(len, item.into())?;
        }
        Ok(self.raw().len())
    }

    /// Remove and return the last item, or `Undefined` when empty.
    pub fn pop(&self) -> Result<Value> {
        self.require(Shape::List, "pop")?;
        let _pause = ReactiveContext::pause_tracking();

        let len = self.raw().len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = self.list_get(len - 1)?;
        self.set_len(len - 1)?;
        Ok(last)
    }

    /// Remove and return the first item, or `Undefined` when empty.
    pub fn shift(&self) -> Result<Value> {
        self.require(Shape::List, "shift")?;
        let _pause = ReactiveContext::pause_tracking();

        let len = self.raw().len();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let first = self.list_get(0)?;
        for index in 1..len {
            let item = self.item_untracked(index)?;
            self.list_set(index - 1, item)?;
        }
        self.set_len(len - 1)?;
        Ok(first)
    }

    /// Prepend `items`, keeping their order. Returns the new length.
    pub fn unshift<I>(&self, items: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require(Shape::List, "unshift")?;
        let _pause = ReactiveContext::pause_tracking();

        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let len = self.raw().len();
        if items.is_empty() {
            return Ok(len);
        }

        let count = items.len();
        for index in (0..len).rev() {
            let item = self.item_untracked(index)?;
            self.list_set(index + count, item)?;
        }
        for (index, item) in items.into_iter().enumerate() {
            self.list_set(index, item)?;
        }
        Ok(self.raw().len())
    }

    /// Remove `delete_count` items at `start` and insert `items` in their
    /// place. Returns the removed items.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.require(Shape::List, "splice")?;
        let _pause = ReactiveContext::pause_tracking();

        let len = self.raw().len();
        let start = start.min(len);
        let end = start + delete_count.min(len - start);

        let removed = (start..end)
            .map(|index| self.list_get(index))
            .collect::<Result<Vec<_>>>()?;

        let inserted = items.into_iter().map(|item| item.into().into_raw());
        let next: Vec<Value> = self.raw().with_list(|current| {
            current[..start]
                .iter()
                .cloned()
                .chain(inserted)
                .chain(current[end..].iter().cloned())
                .collect()
        })?;

        for (index, item) in next.iter().enumerate().skip(start) {
            self.list_set(index, item.clone())?;
        }
        if next.len() < len {
            self.set_len(next.len())?;
        }
        Ok(removed)
    }

    /// Whether the list contains `needle`. NaN is found.
    pub fn includes(&self, needle: impl Into<Value>) -> Result<bool> {
        Ok(self.search("includes", &needle.into(), false, true)?.is_some())
    }

    /// Index of the first item strictly equal to `needle`. NaN is never
    /// found.
    pub fn index_of(&self, needle: impl Into<Value>) -> Result<Option<usize>> {
        self.search("index_of", &needle.into(), false, false)
    }

    /// Index of the last item strictly equal to `needle`. NaN is never
    /// found.
    pub fn last_index_of(&self, needle: impl Into<Value>) -> Result<Option<usize>> {
        self.search("last_index_of", &needle.into(), true, false)
    }

    // Search through the wrapper first, comparing wrapped items and tracking
    // every index visited. A raw needle never equals a wrapped item, so on a
    // miss the raw list is searched too.
    fn search(
        &self,
        op: &'static str,
        needle: &Value,
        from_end: bool,
        nan_matches: bool,
    ) -> Result<Option<usize>> {
        self.require(Shape::List, op)?;

        let matches = |item: &Value| item == needle && (nan_matches || !needle.is_nan());
        let len = self.len();
        let order: Vec<usize> = if from_end {
            (0..len).rev().collect()
        } else {
            (0..len).collect()
        };

        for &index in &order {
            if matches(&self.list_get(index)?) {
                return Ok(Some(index));
            }
        }

        self.raw().with_list(|items| {
            order
                .iter()
                .copied()
                .find(|&index| items.get(index).is_some_and(|item| matches(item)))
        })
    }
}
