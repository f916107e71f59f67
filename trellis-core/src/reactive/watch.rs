//! Watchers
//!
//! A watcher observes a source and invokes a callback with the new and
//! previous values when the source changes. Unlike an effect, the reactive
//! reads (the source) and the reaction to them (the callback) are separate:
//! the callback itself runs untracked.
//!
//! # Sources and Depth
//!
//! A source is a ref, a store, or an arbitrary getter. Deep watching walks
//! the source's object graph during the tracked run so that nested writes
//! trigger the watcher too; the walk is cycle-safe and can be bounded to a
//! fixed number of levels. A store source is watched deeply by default,
//! since the interesting changes live inside it.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::graph::SubId;
use crate::reactive::runtime::{Notify, Runtime, SubscriberHook};
use crate::reactive::signal::Signal;
use crate::reactive::store::Store;
use crate::reactive::value::Value;

/// What a watcher observes.
pub enum WatchSource {
    Ref(Signal<Value>),
    Store(Store),
    Getter(Box<dyn Fn() -> Value + Send + Sync>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Box::new(f))
    }
}

/// How far into nested objects a watcher's tracked run reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deep {
    /// Only the source value itself.
    Off,
    /// The source and up to this many levels of nesting.
    Bounded(usize),
    /// The whole reachable graph.
    Unbounded,
}

pub struct WatchOptions {
    /// Fire the callback right away with `None` as the previous value.
    pub immediate: bool,
    pub deep: Deep,
    /// Stop after the first callback invocation.
    pub once: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            deep: Deep::Off,
            once: false,
        }
    }
}

type CleanupFn = Box<dyn FnOnce() + Send>;
type Callback = Box<dyn FnMut(&Value, Option<&Value>, &mut OnCleanup<'_>) + Send>;

/// Handed to the callback so it can register a cleanup to run before the
/// next invocation, or when the watcher stops.
pub struct OnCleanup<'a> {
    slot: &'a mut Option<CleanupFn>,
}

impl OnCleanup<'_> {
    pub fn on_cleanup<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot = Some(Box::new(f));
    }
}

/// Handle to a running watcher.
pub struct Watcher {
    inner: Arc<WatchInner>,
}

struct WatchInner {
    runtime: Runtime,
    sub: SubId,
    getter: Box<dyn Fn() -> Value + Send + Sync>,
    callback: Mutex<Callback>,
    old: Mutex<Option<Value>>,
    cleanup: Mutex<Option<CleanupFn>>,
    /// Deep watchers fire on every source notification; the source object's
    /// identity never changes, so value comparison would mask every nested
    /// write.
    force: bool,
    once: bool,
}

impl Runtime {
    /// Watch a source. The returned handle stops the watcher when dropped.
    pub fn watch<F>(&self, source: WatchSource, callback: F, options: WatchOptions) -> Watcher
    where
        F: FnMut(&Value, Option<&Value>, &mut OnCleanup<'_>) + Send + 'static,
    {
        let mut limit = match options.deep {
            Deep::Off => None,
            Deep::Bounded(n) => Some(n),
            Deep::Unbounded => Some(usize::MAX),
        };
        if limit.is_none() && matches!(source, WatchSource::Store(_)) {
            limit = Some(usize::MAX);
        }
        let force = limit.is_some();

        let rt = self.clone();
        let getter: Box<dyn Fn() -> Value + Send + Sync> = match source {
            WatchSource::Ref(r) => Box::new(move || {
                let value = r.get();
                if let Some(n) = limit {
                    traverse(&rt, &value, n, &mut HashSet::new());
                }
                value
            }),
            WatchSource::Store(s) => Box::new(move || {
                let value = Value::Store(s.clone());
                if let Some(n) = limit {
                    traverse(&rt, &value, n, &mut HashSet::new());
                }
                value
            }),
            WatchSource::Getter(f) => Box::new(move || {
                let value = f();
                if let Some(n) = limit {
                    traverse(&rt, &value, n, &mut HashSet::new());
                }
                value
            }),
        };

        let runtime = self.clone();
        let inner = Arc::new_cyclic(|weak: &Weak<WatchInner>| {
            let node: Weak<dyn Notify> = weak.clone() as _;
            let sub = runtime.new_subscriber(SubscriberHook::Effect(node), false);
            WatchInner {
                runtime: runtime.clone(),
                sub,
                getter,
                callback: Mutex::new(Box::new(callback)),
                old: Mutex::new(None),
                cleanup: Mutex::new(None),
                force,
                once: options.once,
            }
        });

        if options.immediate {
            inner.job();
        } else {
            // Collect dependencies and the baseline value without firing.
            let value = {
                let _guard = inner.runtime.begin(inner.sub);
                (inner.getter)()
            };
            *inner.old.lock() = Some(value);
        }
        Watcher { inner }
    }
}

/// Visit every reactive value reachable from `value`, reading as we go so
/// the active subscriber picks them all up. `remaining` bounds nesting; refs
/// read through without consuming a level.
fn traverse(rt: &Runtime, value: &Value, remaining: usize, seen: &mut HashSet<u64>) {
    match value {
        Value::Ref(r) => {
            let inner = r.get();
            traverse(rt, &inner, remaining, seen);
        }
        Value::Obj(obj) => {
            let store = rt.wrap(obj);
            traverse(rt, &Value::Store(store), remaining, seen);
        }
        Value::Store(store) => {
            if !seen.insert(store.id()) || remaining == 0 {
                return;
            }
            if store.is_list() {
                let len = store.len();
                for i in 0..len {
                    let item = store.get(i);
                    traverse(rt, &item, remaining - 1, seen);
                }
            } else {
                // The entry count stands in for "the set of keys", so
                // insertions reach deep watchers too.
                store.len();
                for key in store.raw_keys() {
                    let entry = store.get(key.as_str());
                    traverse(rt, &entry, remaining - 1, seen);
                }
            }
        }
        _ => {}
    }
}

impl Notify for WatchInner {
    fn notify(self: Arc<Self>) {
        self.job();
    }
}

impl WatchInner {
    fn job(&self) {
        if !self.runtime.is_active(self.sub) {
            return;
        }
        let new_value = {
            let _guard = self.runtime.begin(self.sub);
            (self.getter)()
        };
        let mut old = self.old.lock();
        let fire = self.force || old.as_ref() != Some(&new_value);
        if fire {
            if let Some(cleanup) = self.cleanup.lock().take() {
                cleanup();
            }
            let mut registered = None;
            {
                let mut callback = self.callback.lock();
                callback(
                    &new_value,
                    old.as_ref(),
                    &mut OnCleanup {
                        slot: &mut registered,
                    },
                );
            }
            *self.cleanup.lock() = registered;
        }
        *old = Some(new_value);
        drop(old);
        if fire && self.once {
            self.halt();
        }
    }

    /// Unsubscribe and run any pending cleanup. Idempotent.
    fn halt(&self) {
        self.runtime.stop(self.sub);
        if let Some(cleanup) = self.cleanup.lock().take() {
            cleanup();
        }
    }
}

impl Watcher {
    /// Stop watching. Any registered cleanup runs now.
    pub fn stop(&self) {
        self.inner.halt();
    }
}

impl Drop for WatchInner {
    fn drop(&mut self) {
        self.runtime.stop(self.sub);
        if let Some(cleanup) = self.cleanup.get_mut().take() {
            cleanup();
        }
    }
}

impl Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("active", &self.inner.runtime.is_active(self.inner.sub))
            .finish()
    }
}
