//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a single value
//! behind one dependency slot and tracks which computations read it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracked run (memo, effect, watcher), the
//!    runtime links the signal's dependency slot to that subscriber.
//!
//! 2. When a signal's value changes, all linked subscribers are notified.
//!    Writing a value equal to the current one notifies nobody.
//!
//! # Thread Safety
//!
//! The value sits behind an `RwLock`; all link bookkeeping goes through the
//! runtime's state lock. Reads return clones.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::graph::DepId;
use crate::reactive::runtime::Runtime;

/// A reactive container for a value of type `T`.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// assert_eq!(count.get(), 0);
/// count.set(5); // notifies subscribers
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    runtime: Runtime,
    dep: DepId,
    value: RwLock<T>,
}

impl Runtime {
    /// Create a signal owned by this runtime.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Signal {
            inner: Arc::new(SignalInner {
                runtime: self.clone(),
                dep: self.new_dep(),
                value: RwLock::new(value),
            }),
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Get the current value.
    ///
    /// If called within a tracked run, also registers the running subscriber
    /// as a dependent of this signal.
    pub fn get(&self) -> T {
        self.inner.runtime.track(self.inner.dep);
        self.inner.value.read().clone()
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// Notification only happens when the value actually changes; writing an
    /// equal value is a no-op.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };
        if changed {
            self.inner.runtime.propagate(self.inner.dep);
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    pub(crate) fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
