//! Link Arena
//!
//! Every edge between a dependency and a subscriber is a `LinkSlot` in an
//! arena, addressed by a stable `LinkId`. A link is simultaneously a node in
//! two intrusive lists:
//!
//! - the dependency's subscriber list (doubly linked via `prev_sub`/`next_sub`)
//! - the subscriber's dependency list (singly linked via `next_dep`; the list
//!   is rebuilt front-to-back on every run, so it is only ever walked forward)
//!
//! # Structural Reuse
//!
//! A subscriber usually reads the same dependencies in the same order on every
//! run. `link` exploits this: the subscriber's `deps_tail` doubles as a cursor
//! through the previous run's list, and when the next expected link already
//! points at the dependency being read, the cursor simply advances without
//! touching the arena. Links left past the cursor when the run ends are stale
//! and get detached by `end_tracking`.
//!
//! # Memory
//!
//! Link slots are recycled through a free list, so steady-state re-runs of a
//! subscriber allocate nothing. Dependency and subscriber slots are never
//! freed; they are small and their count is bounded by the number of reactive
//! values the program creates.

/// Index of a dependency slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u32);

/// Index of a subscriber slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubId(u32);

/// Index of a link slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u32);

impl DepId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl SubId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LinkId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A trackable slot: head and tail of its subscriber list.
#[derive(Debug, Default)]
struct DepSlot {
    subs_head: Option<LinkId>,
    subs_tail: Option<LinkId>,
}

/// One unit of re-executable work, as the graph sees it.
#[derive(Debug)]
struct SubSlot {
    deps_head: Option<LinkId>,
    /// Tail of the dependency list. While `tracking` is set this is the reuse
    /// cursor: the last link matched or created during the current run.
    deps_tail: Option<LinkId>,
    /// Currently collecting dependencies (reentrancy guard in propagation).
    tracking: bool,
    /// Already notified this propagation pass; for memos this doubles as the
    /// cache-is-stale flag.
    dirty: bool,
    /// Cleared by an explicit stop; runs bypass tracking afterwards.
    active: bool,
}

/// One edge. All fields are copied out before list surgery, so the slot type
/// stays `Copy`.
#[derive(Debug, Clone, Copy)]
struct LinkSlot {
    dep: DepId,
    sub: SubId,
    prev_sub: Option<LinkId>,
    next_sub: Option<LinkId>,
    next_dep: Option<LinkId>,
}

/// The link graph arena.
#[derive(Debug, Default)]
pub struct Graph {
    deps: Vec<DepSlot>,
    subs: Vec<SubSlot>,
    links: Vec<LinkSlot>,
    free_links: Vec<LinkId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_dep(&mut self) -> DepId {
        let id = DepId(self.deps.len() as u32);
        self.deps.push(DepSlot::default());
        id
    }

    /// Create a subscriber slot. Memos start dirty (cache stale from birth);
    /// effects start clean.
    pub fn new_sub(&mut self, dirty: bool) -> SubId {
        let id = SubId(self.subs.len() as u32);
        self.subs.push(SubSlot {
            deps_head: None,
            deps_tail: None,
            tracking: false,
            dirty,
            active: true,
        });
        id
    }

    pub fn is_tracking(&self, sub: SubId) -> bool {
        self.subs[sub.index()].tracking
    }

    pub fn is_dirty(&self, sub: SubId) -> bool {
        self.subs[sub.index()].dirty
    }

    pub fn set_dirty(&mut self, sub: SubId, dirty: bool) {
        self.subs[sub.index()].dirty = dirty;
    }

    pub fn is_active(&self, sub: SubId) -> bool {
        self.subs[sub.index()].active
    }

    pub fn set_inactive(&mut self, sub: SubId) {
        self.subs[sub.index()].active = false;
    }

    pub fn subs_head(&self, dep: DepId) -> Option<LinkId> {
        self.deps[dep.index()].subs_head
    }

    pub fn has_subscribers(&self, dep: DepId) -> bool {
        self.deps[dep.index()].subs_head.is_some()
    }

    /// Subscriber and successor of a link in its dependency's subscriber list.
    pub fn link_parts(&self, link: LinkId) -> (SubId, Option<LinkId>) {
        let slot = self.links[link.index()];
        (slot.sub, slot.next_sub)
    }

    /// Attach (or reuse) the edge `dep -> sub`. Must only be called while
    /// `sub` is tracking.
    pub fn link(&mut self, dep: DepId, sub: SubId) {
        debug_assert!(self.subs[sub.index()].tracking);

        let cursor = self.subs[sub.index()].deps_tail;
        let next = match cursor {
            Some(c) => self.links[c.index()].next_dep,
            None => self.subs[sub.index()].deps_head,
        };
        if let Some(n) = next {
            // Same dependency at the same position as last run: reuse.
            if self.links[n.index()].dep == dep {
                self.subs[sub.index()].deps_tail = Some(n);
                return;
            }
        }

        // Splice a fresh link in at the cursor. The unmatched remainder of
        // last run's list stays chained behind it so end_tracking can prune
        // whatever is never re-read.
        let id = self.alloc_link(LinkSlot {
            dep,
            sub,
            prev_sub: None,
            next_sub: None,
            next_dep: next,
        });
        match cursor {
            Some(c) => self.links[c.index()].next_dep = Some(id),
            None => self.subs[sub.index()].deps_head = Some(id),
        }
        self.subs[sub.index()].deps_tail = Some(id);

        // Tail-insert into the dependency's subscriber list, preserving
        // first-tracked notification order.
        match self.deps[dep.index()].subs_tail {
            Some(t) => {
                self.links[id.index()].prev_sub = Some(t);
                self.links[t.index()].next_sub = Some(id);
                self.deps[dep.index()].subs_tail = Some(id);
            }
            None => {
                let slot = &mut self.deps[dep.index()];
                slot.subs_head = Some(id);
                slot.subs_tail = Some(id);
            }
        }
    }

    /// Begin a tracked run: reset the reuse cursor to position zero.
    pub fn start_tracking(&mut self, sub: SubId) {
        let slot = &mut self.subs[sub.index()];
        slot.deps_tail = None;
        slot.tracking = true;
    }

    /// Finish a tracked run: detach every link past the cursor (the entire
    /// list when nothing was read), then clear the tracking and dirty flags.
    pub fn end_tracking(&mut self, sub: SubId) {
        let s = sub.index();
        match self.subs[s].deps_tail {
            Some(tail) => {
                let rest = self.links[tail.index()].next_dep;
                if rest.is_some() {
                    self.links[tail.index()].next_dep = None;
                    self.clear_chain(rest);
                }
            }
            None => {
                let head = self.subs[s].deps_head.take();
                self.clear_chain(head);
            }
        }
        let slot = &mut self.subs[s];
        slot.tracking = false;
        slot.dirty = false;
    }

    /// Force-detach all of a subscriber's edges: an empty tracked run.
    pub fn detach_all(&mut self, sub: SubId) {
        self.start_tracking(sub);
        self.end_tracking(sub);
    }

    fn clear_chain(&mut self, mut cursor: Option<LinkId>) {
        while let Some(l) = cursor {
            cursor = self.links[l.index()].next_dep;
            self.unlink_from_dep(l);
            self.free_link(l);
        }
    }

    /// Remove a link from its dependency's doubly-linked subscriber list,
    /// fixing head/tail. Both halves of the removal happen here, so no
    /// half-removed state is ever observable.
    fn unlink_from_dep(&mut self, l: LinkId) {
        let LinkSlot {
            dep,
            prev_sub,
            next_sub,
            ..
        } = self.links[l.index()];
        match prev_sub {
            Some(p) => self.links[p.index()].next_sub = next_sub,
            None => {
                debug_assert_eq!(
                    self.deps[dep.index()].subs_head,
                    Some(l),
                    "link claims membership of a subscriber list it does not head"
                );
                self.deps[dep.index()].subs_head = next_sub;
            }
        }
        match next_sub {
            Some(n) => self.links[n.index()].prev_sub = prev_sub,
            None => {
                debug_assert_eq!(self.deps[dep.index()].subs_tail, Some(l));
                self.deps[dep.index()].subs_tail = prev_sub;
            }
        }
    }

    fn alloc_link(&mut self, slot: LinkSlot) -> LinkId {
        match self.free_links.pop() {
            Some(id) => {
                self.links[id.index()] = slot;
                id
            }
            None => {
                let id = LinkId(self.links.len() as u32);
                self.links.push(slot);
                id
            }
        }
    }

    fn free_link(&mut self, l: LinkId) {
        let slot = &mut self.links[l.index()];
        slot.prev_sub = None;
        slot.next_sub = None;
        slot.next_dep = None;
        self.free_links.push(l);
    }

    /// Number of edges currently attached.
    pub fn live_links(&self) -> usize {
        self.links.len() - self.free_links.len()
    }

    /// Subscribers of a dependency, in notification order.
    pub fn dep_subscribers(&self, dep: DepId) -> Vec<SubId> {
        let mut out = Vec::new();
        let mut cursor = self.deps[dep.index()].subs_head;
        while let Some(l) = cursor {
            out.push(self.links[l.index()].sub);
            cursor = self.links[l.index()].next_sub;
        }
        out
    }

    /// Dependencies of a subscriber, in read order.
    pub fn sub_dependencies(&self, sub: SubId) -> Vec<DepId> {
        let mut out = Vec::new();
        let mut cursor = self.subs[sub.index()].deps_head;
        while let Some(l) = cursor {
            out.push(self.links[l.index()].dep);
            cursor = self.links[l.index()].next_dep;
        }
        out
    }
}
