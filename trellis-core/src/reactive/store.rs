//! Observable Object Layer
//!
//! A [`Store`] wraps a plain [`Obj`] and makes keyed access observable:
//! every `get` registers a dependency on the specific `(object, key)` pair
//! read, and every `set` notifies only the subscribers of the keys it
//! touched. Wrapping is identity-stable, wrapping the same object twice
//! yields the same store.
//!
//! # Nesting
//!
//! Nesting is handled lazily at read time. A nested plain object comes back
//! wrapped as a store of the same runtime; a nested [`Signal`] (a ref
//! embedded in data) is read through transparently, except at list indices,
//! where refs are handed back as-is.
//!
//! # Lists
//!
//! List length is its own key. Writing past the end, `push`, `pop`, and
//! `set_len` all notify the length's subscribers, and truncation notifies
//! every registered index dependency at or beyond the new length in the same
//! batch, so a subscriber reading several vanished slots re-runs once.

use std::fmt::Debug;
use std::sync::Arc;

use crate::reactive::runtime::Runtime;
use crate::reactive::signal::Signal;
use crate::reactive::value::{Key, Obj, ObjData, Value};

/// An observed object. Cloning shares the wrapper.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    runtime: Runtime,
    target: Obj,
}

impl Runtime {
    /// Wrap an object for observation. Wrapping the same object again
    /// returns the same store.
    pub fn wrap(&self, target: &Obj) -> Store {
        if let Some(existing) = self.existing_wrapper(target.id()) {
            return Store { inner: existing };
        }
        let inner = Arc::new(StoreInner {
            runtime: self.clone(),
            target: target.clone(),
        });
        self.register_wrapper(target.id(), &inner);
        Store { inner }
    }

    /// Make a value observable. Objects are wrapped, already-wrapped stores
    /// pass through unchanged, and scalars and refs need no wrapping.
    pub fn reactive(&self, value: Value) -> Value {
        match value {
            Value::Obj(obj) => Value::Store(self.wrap(&obj)),
            other => other,
        }
    }

    /// A signal holding a dynamic value, with objects made observable on the
    /// way in.
    pub fn value_ref(&self, value: Value) -> Signal<Value> {
        self.signal(self.reactive(value))
    }
}

impl Signal<Value> {
    /// Write through this ref from store data: objects are made observable
    /// before they land.
    pub fn assign(&self, value: Value) {
        let value = self.runtime().reactive(value);
        self.set(value);
    }
}

impl Store {
    /// Identity of the wrapped object.
    pub fn id(&self) -> u64 {
        self.inner.target.id()
    }

    /// The wrapped object itself, unobserved.
    pub fn target(&self) -> &Obj {
        &self.inner.target
    }

    pub fn is_list(&self) -> bool {
        self.inner.target.is_list()
    }

    /// Tracked keyed read.
    ///
    /// Reading a key that does not exist still registers the dependency, so
    /// a later insertion at that key notifies the reader. Refs unwrap
    /// transparently except at list indices. Nested objects come back
    /// wrapped.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let rt = &self.inner.runtime;
        rt.track_key(self.id(), key.clone());

        let raw = self.raw_lookup(&key);
        match raw {
            Some(Value::Ref(r)) => {
                if self.is_list() && matches!(key, Key::Index(_)) {
                    Value::Ref(r)
                } else {
                    rt.reactive(r.get())
                }
            }
            Some(Value::Obj(obj)) => Value::Store(rt.wrap(&obj)),
            Some(other) => other,
            None => Value::Unit,
        }
    }

    /// Untracked raw read. No ref unwrapping, no wrapping of nested objects.
    pub fn raw_get(&self, key: impl Into<Key>) -> Value {
        self.raw_lookup(&key.into()).unwrap_or(Value::Unit)
    }

    fn raw_lookup(&self, key: &Key) -> Option<Value> {
        self.inner.target.with_data(|data| match (data, key) {
            (ObjData::Map(map), Key::Prop(name)) => map.get(name).cloned(),
            (ObjData::Map(map), Key::Len) => Some(Value::Int(map.len() as i64)),
            (ObjData::List(items), Key::Index(i)) => items.get(*i).cloned(),
            (ObjData::List(items), Key::Len) => Some(Value::Int(items.len() as i64)),
            _ => None,
        })
    }

    /// Tracked length: entry count for maps, element count for lists.
    pub fn len(&self) -> usize {
        self.inner.runtime.track_key(self.id(), Key::Len);
        self.len_untracked()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn len_untracked(&self) -> usize {
        self.inner.target.with_data(|data| match data {
            ObjData::Map(map) => map.len(),
            ObjData::List(items) => items.len(),
        })
    }

    /// Untracked key enumeration for maps. Empty for lists.
    pub fn raw_keys(&self) -> Vec<String> {
        self.inner.target.with_data(|data| match data {
            ObjData::Map(map) => map.keys().cloned().collect(),
            ObjData::List(_) => Vec::new(),
        })
    }

    /// Keyed write. Notifies only subscribers of the touched keys, and only
    /// when the stored value actually changed. Writing a non-ref over a
    /// stored ref delegates to the ref instead of replacing it.
    pub fn set(&self, key: impl Into<Key>, value: Value) {
        let key = key.into();
        match key {
            Key::Len => {
                if let Value::Int(n) = value {
                    self.set_len(n.max(0) as usize);
                }
            }
            Key::Prop(name) => self.set_prop(name, value),
            Key::Index(i) => self.set_index(i, value),
        }
    }

    fn set_prop(&self, name: String, value: Value) {
        let existing = self.inner.target.with_data(|data| match data {
            ObjData::Map(map) => map.get(&name).cloned(),
            _ => None,
        });
        if let Some(Value::Ref(r)) = existing {
            if !matches!(value, Value::Ref(_)) {
                r.assign(value);
                return;
            }
        }

        enum Outcome {
            Unchanged,
            Replaced,
            Added,
        }
        let outcome = self.inner.target.with_data_mut(|data| match data {
            ObjData::Map(map) => match map.insert(name.clone(), value.clone()) {
                None => Outcome::Added,
                Some(old) if old != value => Outcome::Replaced,
                Some(_) => Outcome::Unchanged,
            },
            _ => Outcome::Unchanged,
        });
        match outcome {
            Outcome::Unchanged => {}
            Outcome::Replaced => self.notify_keys(&[Key::Prop(name)]),
            // A new entry also changes the map's entry count.
            Outcome::Added => self.notify_keys(&[Key::Prop(name), Key::Len]),
        }
    }

    fn set_index(&self, i: usize, value: Value) {
        enum Outcome {
            Unchanged,
            Replaced,
            Grew,
        }
        let outcome = self.inner.target.with_data_mut(|data| match data {
            ObjData::List(items) => {
                if i < items.len() {
                    if items[i] == value {
                        Outcome::Unchanged
                    } else {
                        items[i] = value.clone();
                        Outcome::Replaced
                    }
                } else {
                    items.resize(i, Value::Unit);
                    items.push(value.clone());
                    Outcome::Grew
                }
            }
            _ => Outcome::Unchanged,
        });
        match outcome {
            Outcome::Unchanged => {}
            Outcome::Replaced => self.notify_keys(&[Key::Index(i)]),
            // Writing past the end changes the length too.
            Outcome::Grew => self.notify_keys(&[Key::Index(i), Key::Len]),
        }
    }

    /// Append to a list, notifying the new index and the length.
    pub fn push(&self, value: Value) {
        let i = self.inner.target.with_data_mut(|data| match data {
            ObjData::List(items) => {
                items.push(value.clone());
                Some(items.len() - 1)
            }
            _ => None,
        });
        if let Some(i) = i {
            self.notify_keys(&[Key::Index(i), Key::Len]);
        }
    }

    /// Remove and return the last list element.
    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.target.with_data_mut(|data| match data {
            ObjData::List(items) => items.pop().map(|v| (items.len(), v)),
            _ => None,
        });
        popped.map(|(i, value)| {
            self.notify_keys(&[Key::Index(i), Key::Len]);
            value
        })
    }

    /// Resize a list. Truncation notifies every registered index dependency
    /// at or beyond the new length together with the length itself, as one
    /// batch.
    pub fn set_len(&self, new_len: usize) {
        let rt = &self.inner.runtime;
        let old_len = self.len_untracked();
        if new_len == old_len || !self.is_list() {
            return;
        }
        self.inner.target.with_data_mut(|data| {
            if let ObjData::List(items) = data {
                items.resize(new_len, Value::Unit);
            }
        });
        let mut deps = if new_len < old_len {
            rt.index_deps_from(self.id(), new_len)
        } else {
            Vec::new()
        };
        if let Some(len_dep) = rt.key_dep(self.id(), &Key::Len) {
            deps.push(len_dep);
        }
        rt.propagate_batch(&deps);
    }

    fn notify_keys(&self, keys: &[Key]) {
        let rt = &self.inner.runtime;
        let deps: Vec<_> = keys
            .iter()
            .filter_map(|key| rt.key_dep(self.id(), key))
            .collect();
        rt.propagate_batch(&deps);
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("target", &self.inner.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn wrapping_is_idempotent() {
        let rt = Runtime::new();
        let obj = Obj::map_from([("n", Value::Int(1))]);
        let a = rt.wrap(&obj);
        let b = rt.wrap(&obj);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));

        // reactive() passes an existing store through unchanged.
        let v = rt.reactive(Value::Store(a.clone()));
        assert_eq!(v, Value::Store(b));
    }

    #[test]
    fn keyed_reads_and_writes_round_trip() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::map());
        assert_eq!(store.get("missing"), Value::Unit);

        store.set("n", Value::Int(7));
        assert_eq!(store.get("n"), Value::Int(7));
        assert_eq!(store.raw_keys(), vec!["n".to_string()]);
    }

    #[test]
    fn only_the_touched_key_notifies() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::map_from([("a", Value::Int(1)), ("b", Value::Int(2))]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let store_clone = store.clone();
        let _effect = rt.effect(move || {
            store_clone.get("a");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set("b", Value::Int(20));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set("a", Value::Int(10));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Equal write is a no-op.
        store.set("a", Value::Int(10));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_key_read_sees_later_insertion() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::map());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let store_clone = store.clone();
        let _effect = rt.effect(move || {
            store_clone.get("later");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set("later", Value::Int(1));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_objects_wrap_lazily_and_stably() {
        let rt = Runtime::new();
        let child = Obj::map_from([("n", Value::Int(1))]);
        let store = rt.wrap(&Obj::map_from([("child", Value::Obj(child.clone()))]));

        let Value::Store(nested) = store.get("child") else {
            panic!("nested object should come back wrapped");
        };
        assert_eq!(nested.id(), child.id());
        assert_eq!(store.get("child"), Value::Store(nested.clone()));

        nested.set("n", Value::Int(2));
        assert_eq!(nested.get("n"), Value::Int(2));
    }

    #[test]
    fn refs_unwrap_in_maps_and_delegate_writes() {
        let rt = Runtime::new();
        let count = rt.value_ref(Value::Int(1));
        let store = rt.wrap(&Obj::map_from([("count", Value::Ref(count.clone()))]));

        assert_eq!(store.get("count"), Value::Int(1));

        // A non-ref write lands in the ref, not over it.
        store.set("count", Value::Int(5));
        assert_eq!(count.get_untracked(), Value::Int(5));
        assert!(matches!(store.raw_get("count"), Value::Ref(_)));
    }

    #[test]
    fn refs_at_list_indices_stay_wrapped() {
        let rt = Runtime::new();
        let item = rt.value_ref(Value::Int(1));
        let store = rt.wrap(&Obj::list([Value::Ref(item)]));
        assert!(matches!(store.get(0usize), Value::Ref(_)));
    }

    #[test]
    fn writing_past_the_end_notifies_length() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::list([Value::Int(0)]));

        let lens = Arc::new(AtomicI32::new(0));
        let lens_clone = lens.clone();
        let store_clone = store.clone();
        let _effect = rt.effect(move || {
            store_clone.len();
            lens_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(lens.load(Ordering::SeqCst), 1);

        store.set(3usize, Value::Int(3));
        assert_eq!(lens.load(Ordering::SeqCst), 2);
        assert_eq!(store.raw_get(2usize), Value::Unit);

        // In-bounds writes leave the length alone.
        store.set(0usize, Value::Int(9));
        assert_eq!(lens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn truncation_notifies_vanished_indices_once() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::list([
            Value::Int(0),
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ]));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let store_clone = store.clone();
        let _effect = rt.effect(move || {
            store_clone.get(2usize);
            store_clone.get(3usize);
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Both read slots vanish; one batch, one re-run.
        store.set_len(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(store.raw_get(2usize), Value::Unit);
    }

    #[test]
    fn push_and_pop_notify_length() {
        let rt = Runtime::new();
        let store = rt.wrap(&Obj::list([Value::Int(1)]));

        let lens = Arc::new(AtomicI32::new(0));
        let lens_clone = lens.clone();
        let store_clone = store.clone();
        let _effect = rt.effect(move || {
            store_clone.len();
            lens_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.push(Value::Int(2));
        assert_eq!(lens.load(Ordering::SeqCst), 2);

        assert_eq!(store.pop(), Some(Value::Int(2)));
        assert_eq!(lens.load(Ordering::SeqCst), 3);

        assert_eq!(store.pop(), Some(Value::Int(1)));
        assert_eq!(store.pop(), None);
    }

    #[test]
    fn value_ref_wraps_objects_on_the_way_in() {
        let rt = Runtime::new();
        let r = rt.value_ref(Value::Obj(Obj::map()));
        assert!(matches!(r.get_untracked(), Value::Store(_)));
    }
}
