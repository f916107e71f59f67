//! Effect Implementation
//!
//! An Effect runs a closure and re-runs it whenever any reactive value it
//! read during the last run changes. Dependencies are collected fresh on
//! every run, so conditional reads prune themselves automatically.
//!
//! # Scheduling
//!
//! By default a notified effect re-runs synchronously, inside the write that
//! triggered it. A custom scheduler replaces that: the runtime hands it the
//! effect handle and the scheduler decides when (or whether) to call `run`,
//! which is how batching and deferred flushing are built on top.
//!
//! # Lifecycle
//!
//! `stop` detaches the effect from everything it was subscribed to. A stopped
//! effect can still be run manually; such runs execute the body without
//! tracking, so they re-subscribe to nothing.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crate::graph::SubId;
use crate::reactive::runtime::{Notify, Runtime, SubscriberHook};

/// When a notified effect actually re-runs.
pub enum Scheduler {
    /// Re-run synchronously during propagation.
    Sync,
    /// Hand the effect to user code, which decides when to call `run`.
    Custom(Box<dyn Fn(&Effect) + Send + Sync>),
}

/// A reactive computation run for its side effects.
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    runtime: Runtime,
    sub: SubId,
    body: Box<dyn Fn() + Send + Sync>,
    scheduler: Scheduler,
}

impl Runtime {
    /// Create an effect and run it once immediately to collect its initial
    /// dependencies.
    pub fn effect<F>(&self, body: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.build_effect(Box::new(body), Scheduler::Sync)
    }

    /// Create an effect with a custom scheduler. The first run still happens
    /// immediately; only notifications go through the scheduler.
    pub fn effect_with<F>(&self, body: F, scheduler: Scheduler) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.build_effect(Box::new(body), scheduler)
    }

    fn build_effect(&self, body: Box<dyn Fn() + Send + Sync>, scheduler: Scheduler) -> Effect {
        let runtime = self.clone();
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let node: Weak<dyn Notify> = weak.clone() as _;
            let sub = runtime.new_subscriber(SubscriberHook::Effect(node), false);
            EffectInner {
                runtime: runtime.clone(),
                sub,
                body,
                scheduler,
            }
        });
        let effect = Effect { inner };
        effect.run();
        effect
    }
}

impl Notify for EffectInner {
    fn notify(self: Arc<Self>) {
        let effect = Effect { inner: self };
        match &effect.inner.scheduler {
            Scheduler::Sync => effect.run(),
            Scheduler::Custom(schedule) => schedule(&effect),
        }
    }
}

impl Effect {
    /// Run the body now. Active effects run tracked, collecting a fresh
    /// dependency set; stopped effects run untracked.
    pub fn run(&self) {
        if self.inner.runtime.is_active(self.inner.sub) {
            let _guard = self.inner.runtime.begin(self.inner.sub);
            (self.inner.body)();
        } else {
            (self.inner.body)();
        }
    }

    /// Permanently unsubscribe from all dependencies. Idempotent.
    pub fn stop(&self) {
        self.inner.runtime.stop(self.inner.sub);
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.runtime.stop(self.sub);
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("active", &self.inner.runtime.is_active(self.inner.sub))
            .finish()
    }
}
