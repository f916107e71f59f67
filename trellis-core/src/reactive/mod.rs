//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects,
//! stores, and watchers, all coordinated by an explicit [`Runtime`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo, effect, or watcher), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It recomputes only when
//! one of its dependencies changes, and notifies its own dependents only when
//! the recomputed value actually differs from the cached one.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Dependencies are collected fresh on every run, so a
//! branch that stops being read stops triggering the effect.
//!
//! ## Stores
//!
//! A Store makes a plain object observable at per-key granularity: reads of
//! `(object, key)` pairs become dependencies, writes notify exactly the keys
//! they touched.
//!
//! ## Watchers
//!
//! A Watcher separates observation from reaction: a tracked source (ref,
//! store, or getter) on one side, an untracked callback receiving the new
//! and previous values on the other.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic. Each runtime keeps a single
//! active-subscriber slot; reads link the value being read to whatever
//! subscriber is active, and nested runs save and restore the slot. This
//! approach (sometimes called "transparent reactivity") is used by SolidJS,
//! Vue 3, and Leptos.

mod effect;
mod memo;
mod runtime;
mod signal;
mod store;
mod value;
mod watch;

pub use effect::{Effect, Scheduler};
pub use memo::Memo;
pub use runtime::Runtime;
pub use signal::Signal;
pub use store::Store;
pub use value::{Key, Obj, Value};
pub use watch::{Deep, OnCleanup, WatchOptions, WatchSource, Watcher};

/// Errors surfaced by reactive operations that are usage mistakes rather
/// than bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A write was attempted on a memo that has no setter.
    #[error("write operation failed: computed value is read-only")]
    ReadOnlyMemo,
}
