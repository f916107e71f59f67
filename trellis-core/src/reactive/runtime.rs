//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! effects, stores, and watchers. It owns the link graph, the per-(object,key)
//! dependency registry, and the active-subscriber slot, and it drives update
//! propagation when a dependency changes.
//!
//! # How It Works
//!
//! 1. When a reactive value is created it allocates slots in the runtime's
//!    link graph.
//!
//! 2. When a value is read inside a tracked run, the runtime links the value's
//!    dependency slot to the currently active subscriber.
//!
//! 3. When a value changes, propagation runs in two phases. The marking
//!    phase walks the graph under the state lock, flagging every reachable
//!    subscriber once: memos become stale, effects are queued along with the
//!    memos they were reached through. The flush phase then validates each
//!    queued effect, recomputing its trigger memos at most once each, and
//!    runs the effect only when something actually changed. Memos nobody was
//!    notified through stay stale and recompute lazily on their next read.
//!
//! # Concurrency
//!
//! Execution is single-threaded and cooperative. All graph and registry
//! mutation happens under one mutex, and user code (getters, effect bodies,
//! callbacks) always runs with that mutex released, so nested runs and
//! reentrant construction are safe. Nesting is handled by save/restore of the
//! single active-subscriber slot around each tracked run.
//!
//! Every `Runtime` instance is fully isolated; tests typically construct one
//! per case. Handles are cheap to clone and share one inner state.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::graph::{DepId, Graph, SubId};
use crate::reactive::store::StoreInner;
use crate::reactive::value::Key;

/// A subscriber that re-executes for its side effects when notified.
pub(crate) trait Notify: Send + Sync {
    fn notify(self: Arc<Self>);
}

/// A subscriber holding a cached value that can be brought up to date on
/// demand. `refresh` makes the cache fresh (recomputing at most once per
/// propagation pass) and reports whether the value changed.
pub(crate) trait Refresh: Send + Sync {
    fn refresh(&self) -> bool;
}

/// How propagation reacts to a given subscriber. Memos carry the id of their
/// own dependency slot so propagation can recurse into their readers.
pub(crate) enum SubscriberHook {
    Effect(Weak<dyn Notify>),
    Memo {
        node: Weak<dyn Refresh>,
        dep: DepId,
    },
}

/// Everything behind the runtime's single state lock.
pub(crate) struct State {
    pub(crate) graph: Graph,
    /// Notification hooks, indexed by subscriber id.
    hooks: Vec<SubscriberHook>,
    /// The one subscriber currently collecting dependencies, if any.
    active: Option<SubId>,
    /// Per-(object identity, key) dependency slots. `IndexMap` keeps keys in
    /// first-tracked order.
    key_deps: HashMap<u64, IndexMap<Key, DepId>>,
}

struct RuntimeInner {
    state: Mutex<State>,
    /// Observed wrappers by target object identity, so wrapping the same
    /// object twice yields the same store. Weak: an unreferenced wrapper is
    /// free to go away.
    wrappers: Mutex<HashMap<u64, Weak<StoreInner>>>,
}

/// Handle to a reactive runtime instance.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// An effect reached by the marking phase, waiting for the flush.
struct PendingEffect {
    sub: SubId,
    node: Weak<dyn Notify>,
    /// Reached directly from a written dependency; no validation needed.
    direct: bool,
    /// Memos this effect was reached through. If none of them actually
    /// changed value, the effect does not run.
    triggers: SmallVec<[Weak<dyn Refresh>; 2]>,
}

/// What the marking walk found in a subscriber slot, copied out so the walk
/// can keep borrowing the state mutably.
enum MarkStep {
    Effect(Weak<dyn Notify>),
    Memo(Weak<dyn Refresh>, DepId),
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                state: Mutex::new(State {
                    graph: Graph::new(),
                    hooks: Vec::new(),
                    active: None,
                    key_deps: HashMap::new(),
                }),
                wrappers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn new_dep(&self) -> DepId {
        self.inner.state.lock().graph.new_dep()
    }

    pub(crate) fn new_subscriber(&self, hook: SubscriberHook, dirty: bool) -> SubId {
        let mut st = self.inner.state.lock();
        let sub = st.graph.new_sub(dirty);
        debug_assert_eq!(sub.index(), st.hooks.len());
        st.hooks.push(hook);
        sub
    }

    /// Record that the currently active subscriber (if any) read `dep`.
    pub(crate) fn track(&self, dep: DepId) {
        let mut st = self.inner.state.lock();
        let Some(sub) = st.active else { return };
        if st.graph.is_tracking(sub) {
            st.graph.link(dep, sub);
        }
    }

    /// Enter a tracked run for `sub`. The returned guard restores the previous
    /// active subscriber and finishes tracking when dropped, on every exit
    /// path including a panic in the tracked body.
    pub(crate) fn begin(&self, sub: SubId) -> TrackGuard {
        let mut st = self.inner.state.lock();
        let prev = st.active.replace(sub);
        st.graph.start_tracking(sub);
        TrackGuard {
            runtime: self.clone(),
            sub,
            prev,
        }
    }

    pub(crate) fn is_dirty(&self, sub: SubId) -> bool {
        self.inner.state.lock().graph.is_dirty(sub)
    }

    pub(crate) fn is_active(&self, sub: SubId) -> bool {
        self.inner.state.lock().graph.is_active(sub)
    }

    /// Detach all of a subscriber's edges and retire it. Idempotent; after
    /// this the subscriber is never notified again.
    pub(crate) fn stop(&self, sub: SubId) {
        let mut st = self.inner.state.lock();
        st.graph.detach_all(sub);
        st.graph.set_inactive(sub);
    }

    /// Link the currently active subscriber to the dependency slot for
    /// `(target, key)`, creating the slot on first use. Reads outside a
    /// tracked run do not create anything.
    pub(crate) fn track_key(&self, target: u64, key: Key) {
        let mut st = self.inner.state.lock();
        let Some(sub) = st.active else { return };
        if !st.graph.is_tracking(sub) {
            return;
        }
        let existing = st.key_deps.get(&target).and_then(|m| m.get(&key)).copied();
        let dep = match existing {
            Some(dep) => dep,
            None => {
                let dep = st.graph.new_dep();
                st.key_deps.entry(target).or_default().insert(key, dep);
                dep
            }
        };
        st.graph.link(dep, sub);
    }

    /// Dependency slot for `(target, key)` if any read ever registered one.
    pub(crate) fn key_dep(&self, target: u64, key: &Key) -> Option<DepId> {
        let st = self.inner.state.lock();
        st.key_deps.get(&target).and_then(|m| m.get(key)).copied()
    }

    /// Registered numeric-key dependencies of `target` at or above `from`, in
    /// first-tracked order. Used when a list is truncated.
    pub(crate) fn index_deps_from(&self, target: u64, from: usize) -> Vec<DepId> {
        let st = self.inner.state.lock();
        match st.key_deps.get(&target) {
            Some(map) => map
                .iter()
                .filter_map(|(key, dep)| match key {
                    Key::Index(i) if *i >= from => Some(*dep),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Notify everything downstream of `dep`.
    pub(crate) fn propagate(&self, dep: DepId) {
        self.propagate_batch(&[dep]);
    }

    /// Notify everything downstream of a set of dependencies as one batch:
    /// each subscriber is notified at most once even when several of the
    /// dependencies reach it, and each memo on the way recomputes at most
    /// once.
    pub(crate) fn propagate_batch(&self, deps: &[DepId]) {
        // Marking phase. The whole walk happens under one lock acquisition
        // and runs no user code, so the link lists cannot change under it.
        let mut queue: Vec<PendingEffect> = Vec::new();
        {
            let mut st = self.inner.state.lock();
            let mut queued_at: HashMap<SubId, usize> = HashMap::new();
            for &dep in deps {
                Self::mark(&mut st, dep, None, &mut queue, &mut queued_at);
            }
        }
        tracing::trace!(queued = queue.len(), "propagation marks placed");

        // Flush phase. Validation recomputes each trigger memo at most once
        // (stale ones refresh, ones already pulled fresh this pass just
        // report); anything it leaves stale gets pulled by the effect's own
        // reads.
        for pending in queue {
            let run = pending.direct
                || pending.triggers.iter().any(|memo| {
                    memo.upgrade().map(|m| m.refresh()).unwrap_or(false)
                });
            if !self.is_active(pending.sub) {
                continue;
            }
            if run {
                if let Some(node) = pending.node.upgrade() {
                    node.notify();
                }
            } else {
                // Nothing upstream really changed; re-arm for the next pass.
                self.inner.state.lock().graph.set_dirty(pending.sub, false);
            }
        }
    }

    /// Walk `dep`'s subscriber list, flagging each reachable subscriber
    /// once. Memos are marked stale and their own subscribers walked in
    /// turn, without recomputing anything yet; effects are queued together
    /// with the memo (if any) they were reached through. `via` is that memo
    /// for the current walk level, `None` when walking a written dependency
    /// itself.
    fn mark(
        st: &mut State,
        dep: DepId,
        via: Option<&Weak<dyn Refresh>>,
        queue: &mut Vec<PendingEffect>,
        queued_at: &mut HashMap<SubId, usize>,
    ) {
        let mut cursor = st.graph.subs_head(dep);
        while let Some(link) = cursor {
            let (sub, next) = st.graph.link_parts(link);
            cursor = next;
            // A subscriber in the middle of its own run caused this write;
            // it is never notified by its own reads.
            if st.graph.is_tracking(sub) {
                continue;
            }
            if st.graph.is_dirty(sub) {
                // Already reached this pass (its subscribers are walked), or
                // still pending from an earlier one. An effect queued this
                // pass still collects the extra reason it was reached.
                if let Some(&at) = queued_at.get(&sub) {
                    match via {
                        Some(memo) => queue[at].triggers.push(memo.clone()),
                        None => queue[at].direct = true,
                    }
                }
                continue;
            }
            st.graph.set_dirty(sub, true);
            let step = match &st.hooks[sub.index()] {
                SubscriberHook::Effect(node) => MarkStep::Effect(node.clone()),
                SubscriberHook::Memo { node, dep } => MarkStep::Memo(node.clone(), *dep),
            };
            match step {
                MarkStep::Effect(node) => {
                    let mut triggers = SmallVec::new();
                    if let Some(memo) = via {
                        triggers.push(memo.clone());
                    }
                    queued_at.insert(sub, queue.len());
                    queue.push(PendingEffect {
                        sub,
                        node,
                        direct: via.is_none(),
                        triggers,
                    });
                }
                MarkStep::Memo(node, memo_dep) => {
                    Self::mark(st, memo_dep, Some(&node), queue, queued_at);
                }
            }
        }
    }

    /// The live wrapper for an object, if one was ever created and is still
    /// referenced somewhere.
    pub(crate) fn existing_wrapper(&self, target: u64) -> Option<Arc<StoreInner>> {
        self.inner.wrappers.lock().get(&target).and_then(Weak::upgrade)
    }

    pub(crate) fn register_wrapper(&self, target: u64, wrapper: &Arc<StoreInner>) {
        self.inner
            .wrappers
            .lock()
            .insert(target, Arc::downgrade(wrapper));
    }

    #[cfg(test)]
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.inner.state.lock())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Runtime")
            .field("live_links", &st.graph.live_links())
            .field("tracked_objects", &st.key_deps.len())
            .finish()
    }
}

/// Guard for one tracked run. Restores the previous active subscriber and
/// finishes tracking when dropped, even if the tracked body panicked.
pub(crate) struct TrackGuard {
    runtime: Runtime,
    sub: SubId,
    prev: Option<SubId>,
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        let mut st = self.runtime.inner.state.lock();
        st.graph.end_tracking(self.sub);
        debug_assert_eq!(
            st.active,
            Some(self.sub),
            "tracked runs must unwind in construction order"
        );
        st.active = self.prev;
    }
}
