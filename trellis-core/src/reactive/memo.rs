//! Memo Implementation
//!
//! A Memo is a cached derived value. It is both sides of the graph at once: a
//! subscriber of everything its getter reads, and a dependency of everything
//! that reads it.
//!
//! # How Memos Work
//!
//! 1. Construction never runs the getter. The first read computes and caches.
//!
//! 2. A read while clean returns the cache without re-invoking the getter, and
//!    links the memo to the reading subscriber — a chain of memos re-links on
//!    every read, not just on dirty reads.
//!
//! 3. When a source changes, propagation marks the memo stale. If an effect
//!    downstream was reached through it, the flush recomputes the memo once
//!    (pulling any stale memos it reads along the way) and the effect runs
//!    only when the value actually changed (change-gated propagation). With
//!    nothing downstream it stays stale and recomputes lazily on the next
//!    read.
//!
//! # Writes
//!
//! A memo may carry an optional setter. Without one, writing is a usage error:
//! `set` logs a warning and ignores the value, `try_set` reports
//! [`ReactiveError::ReadOnlyMemo`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::graph::{DepId, SubId};
use crate::reactive::runtime::{Refresh, Runtime, SubscriberHook};
use crate::reactive::ReactiveError;

/// A cached derived value that recomputes only when its sources change.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    runtime: Runtime,
    /// This memo as a dependency of its readers.
    dep: DepId,
    /// This memo as a subscriber of its sources.
    sub: SubId,
    getter: Box<dyn Fn() -> T + Send + Sync>,
    setter: Option<Box<dyn Fn(T) + Send + Sync>>,
    /// `None` until first computed.
    value: RwLock<Option<T>>,
    /// Whether the most recent recompute changed the cached value. Read by
    /// `refresh` when the cache was already brought up to date through a
    /// pull earlier in the same propagation pass.
    changed: AtomicBool,
}

impl Runtime {
    /// Create a read-only derived value. The getter does not run until the
    /// first read.
    pub fn memo<T, F>(&self, getter: F) -> Memo<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.build_memo(Box::new(getter), None)
    }

    /// Create a writable derived value: reads go through the getter, writes
    /// through the setter.
    pub fn memo_with_setter<T, F, S>(&self, getter: F, setter: S) -> Memo<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.build_memo(Box::new(getter), Some(Box::new(setter)))
    }

    fn build_memo<T>(
        &self,
        getter: Box<dyn Fn() -> T + Send + Sync>,
        setter: Option<Box<dyn Fn(T) + Send + Sync>>,
    ) -> Memo<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let runtime = self.clone();
        let inner = Arc::new_cyclic(|weak: &Weak<MemoInner<T>>| {
            let dep = runtime.new_dep();
            let node: Weak<dyn Refresh> = weak.clone();
            // Memos are born dirty: the cache is stale until the first read.
            let sub = runtime.new_subscriber(SubscriberHook::Memo { node, dep }, true);
            MemoInner {
                runtime: runtime.clone(),
                dep,
                sub,
                getter,
                setter,
                value: RwLock::new(None),
                changed: AtomicBool::new(false),
            }
        });
        Memo { inner }
    }
}

impl<T> Refresh for MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn refresh(&self) -> bool {
        if self.runtime.is_dirty(self.sub) {
            self.update()
        } else {
            // A downstream memo's getter already pulled this one fresh
            // during the current pass.
            self.changed.load(Ordering::Relaxed)
        }
    }
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Re-run the getter under tracking and swap in the new cache value.
    /// Returns whether the value changed.
    fn update(&self) -> bool {
        let new_value = {
            let _guard = self.runtime.begin(self.sub);
            (self.getter)()
        };
        let mut cache = self.value.write();
        let changed = cache.as_ref() != Some(&new_value);
        *cache = Some(new_value);
        self.changed.store(changed, Ordering::Relaxed);
        changed
    }
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Get the current value, recomputing first if any source changed since
    /// the last read. Also links this memo as a dependency of the subscriber
    /// currently tracking, if any.
    pub fn get(&self) -> T {
        let stale =
            self.inner.runtime.is_dirty(self.inner.sub) || self.inner.value.read().is_none();
        if stale {
            self.inner.update();
        }
        self.inner.runtime.track(self.inner.dep);
        self.inner
            .value
            .read()
            .clone()
            .expect("memo refreshed above")
    }

    /// Write through the setter, or report a usage error for a read-only
    /// memo. The failed write leaves the cache untouched.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ReadOnlyMemo),
        }
    }

    /// Write through the setter; a write to a read-only memo is ignored with
    /// a diagnostic, matching the non-fatal usage-error contract.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            tracing::warn!(%err, "memo write ignored");
        }
    }

    /// Whether the getter has ever run.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
