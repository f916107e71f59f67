//! Dynamic Values
//!
//! Stores and watchers traffic in [`Value`], a small dynamic type that can
//! hold scalars, reactive references, and shared objects. Objects carry a
//! process-wide identity so the runtime can key per-property dependency slots
//! on them.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::reactive::signal::Signal;
use crate::reactive::store::Store;

/// Key into an object: a named property, a list index, or a list's length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Prop(String),
    Index(usize),
    Len,
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Prop(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Prop(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// A dynamically typed value.
///
/// Equality follows identity semantics for the reference variants: two `Obj`
/// values are equal only when they are the same shared object, and two `Ref`
/// values only when they are the same signal. `Float` treats NaN as equal to
/// itself so that writing NaN over NaN is a no-op rather than an endless
/// change.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A reactive reference embedded in data. Stores read through these.
    Ref(Signal<Value>),
    /// A plain shared object, not yet observed.
    Obj(Obj),
    /// An observed object. Reads and writes through it are tracked.
    Store(Store),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Obj(a), Value::Obj(b)) => a.id() == b.id(),
            (Value::Store(a), Value::Store(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Obj> for Value {
    fn from(v: Obj) -> Self {
        Value::Obj(v)
    }
}

static NEXT_OBJ_ID: AtomicU64 = AtomicU64::new(1);

/// The contents of an [`Obj`]: either a string-keyed map or a list.
#[derive(Debug)]
pub enum ObjData {
    Map(IndexMap<String, Value>),
    List(Vec<Value>),
}

struct ObjInner {
    id: u64,
    data: RwLock<ObjData>,
}

/// A shared mutable object with stable identity. Cloning shares the same
/// underlying data.
#[derive(Clone)]
pub struct Obj {
    inner: Arc<ObjInner>,
}

impl Obj {
    fn from_data(data: ObjData) -> Self {
        Self {
            inner: Arc::new(ObjInner {
                id: NEXT_OBJ_ID.fetch_add(1, Ordering::Relaxed),
                data: RwLock::new(data),
            }),
        }
    }

    /// An empty map object.
    pub fn map() -> Self {
        Self::from_data(ObjData::Map(IndexMap::new()))
    }

    /// A map object built from entries.
    pub fn map_from<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::from_data(ObjData::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// A list object built from items.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::from_data(ObjData::List(items.into_iter().collect()))
    }

    /// Stable identity of this object. Clones share it.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_list(&self) -> bool {
        matches!(&*self.inner.data.read(), ObjData::List(_))
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&ObjData) -> R) -> R {
        f(&self.inner.data.read())
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut ObjData) -> R) -> R {
        f(&mut self.inner.data.write())
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("Obj")
            .field("id", &self.inner.id)
            .field("data", &*data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_equal_to_itself() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(1.0));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Obj::map();
        let b = Obj::map();
        assert_eq!(Value::Obj(a.clone()), Value::Obj(a.clone()));
        assert_ne!(Value::Obj(a), Value::Obj(b));
    }

    #[test]
    fn clones_share_identity_and_data() {
        let a = Obj::list([Value::Int(1)]);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        b.with_data_mut(|data| {
            if let ObjData::List(items) = data {
                items.push(Value::Int(2));
            }
        });
        assert_eq!(a.with_data(|d| match d {
            ObjData::List(items) => items.len(),
            _ => 0,
        }), 2);
    }

    #[test]
    fn scalars_compare_by_value() {
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1i64), Value::Float(1.0));
        assert_eq!(Value::Unit, Value::Unit);
    }
}
