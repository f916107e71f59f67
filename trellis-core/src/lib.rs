//! Trellis Core
//!
//! This crate provides the core reactive engine of Trellis: a fine-grained
//! pull/push hybrid dependency-tracking system. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - An observable object layer with per-key dependency tracking
//! - Watchers with deep traversal, cleanup, and one-shot modes
//! - The underlying link graph connecting producers to consumers
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: The user-facing primitives and the runtime that drives them
//! - `graph`: The arena-backed link graph the runtime maintains
//!
//! Everything hangs off an explicit [`Runtime`](reactive::Runtime) instance;
//! there is no global state, and independent runtimes are fully isolated.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//! let count = rt.signal(0);
//!
//! let count_for_memo = count.clone();
//! let doubled = rt.memo(move || count_for_memo.get() * 2);
//!
//! let doubled_for_effect = doubled.clone();
//! let effect = rt.effect(move || {
//!     let _ = doubled_for_effect.get();
//! });
//!
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! # drop(effect);
//! ```

pub mod graph;
pub mod reactive;

pub use reactive::{
    Deep, Effect, Key, Memo, Obj, OnCleanup, ReactiveError, Runtime, Scheduler, Signal, Store,
    Value, WatchOptions, WatchSource, Watcher,
};
