//! Resource cache gate
//!
//! Defers work that reads the generated-resource cache until the first
//! successful sync or build has cleared it. Until then the cache is
//! "dirty": waiters are queued, and each failed sync/build is reported to
//! every queued waiter without dropping it from the queue.
//!
//! ## Registration precedence
//!
//! `wait_until_clean(on_clean, on_failure)` resolves against current state:
//! 1. clean: `on_clean` runs now; `on_failure` never runs
//! 2. dirty after a failure: `on_failure` runs now and the waiter is queued
//! 3. dirty, no failure yet: the waiter is queued silently
//!
//! ## Locking
//!
//! All state lives behind one mutex. Callbacks never run while it is held,
//! so a callback may call back into the gate. The cache-clear action runs
//! under the mutex and must not re-enter the gate.
//!
//! Events on a dirty gate are delivered one at a time per gate; the thread
//! delivering may re-enter, other threads wait. Once clean, events return
//! at once.

mod dispatch;
mod waiter;

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::CacheClearer;
use dispatch::DispatchLock;
use waiter::{resume, run_all, run_captured, Waiter};

pub use waiter::{OnClean, OnFailure, WaiterId};

/// Mutable gate state, always mutated together.
#[derive(Debug, Default)]
struct GateState {
    /// Cache cleared at least once. Never reverts.
    clean: bool,
    /// Most recent event while dirty was a failure.
    last_result_was_failure: bool,
    /// Failure events observed while dirty.
    failure_epoch: u64,
    /// Waiters registered while dirty. Empty once clean.
    pending: Vec<Waiter>,
}

/// Point-in-time view of a gate, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSnapshot {
    /// Project the gate belongs to
    pub project: String,
    pub clean: bool,
    pub last_result_was_failure: bool,
    /// Waiters still queued
    pub pending_waiters: usize,
    /// Failure events observed before the cache became clean
    pub failures_observed: u64,
}

/// One-shot gate over the generated-resource cache of a single project.
pub struct ResourceCacheGate {
    project: String,
    state: Mutex<GateState>,
    dispatch: DispatchLock,
    next_waiter: AtomicU64,
    clearer: Box<dyn CacheClearer>,
}

impl ResourceCacheGate {
    /// Create a dirty gate with no pending waiters.
    pub fn new<C: CacheClearer + 'static>(clearer: C) -> Self {
        Self::for_project("default", clearer)
    }

    /// Create a dirty gate bound to `project`.
    pub fn for_project<C: CacheClearer + 'static>(project: impl Into<String>, clearer: C) -> Self {
        Self {
            project: project.into(),
            state: Mutex::new(GateState::default()),
            dispatch: DispatchLock::new(),
            next_waiter: AtomicU64::new(1),
            clearer: Box::new(clearer),
        }
    }

    /// Create a shared gate.
    pub fn shared<C: CacheClearer + 'static>(project: impl Into<String>, clearer: C) -> Arc<Self> {
        Arc::new(Self::for_project(project, clearer))
    }

    /// Project this gate belongs to.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Report a successful sync/build.
    ///
    /// The first call clears the cache and releases every queued waiter's
    /// success callback on this thread. Later calls do nothing and never
    /// block.
    ///
    /// While the gate is dirty, events are delivered one at a time. A
    /// callback may report events from its own thread, but reporting one
    /// from another thread and waiting for it deadlocks.
    pub fn build_succeeded(&self) {
        self.clear_cache_if_necessary();
    }

    /// Clear the cache and mark the gate clean, unless already clean.
    pub fn clear_cache_if_necessary(&self) {
        if self.is_clean() {
            return;
        }
        let _delivery = self.dispatch.acquire();

        let released = {
            let mut state = self.lock_state();
            if state.clean {
                return;
            }
            // A panic here leaves the gate dirty; the next success retries.
            self.clearer.clear();
            state.clean = true;
            mem::take(&mut state.pending)
        };

        info!(
            project = %self.project,
            waiters = released.len(),
            "resource cache clean, releasing waiters"
        );
        run_all(released.into_iter().map(|waiter| waiter.on_clean));
    }

    /// Report a failed sync/build.
    ///
    /// While dirty, every queued waiter's failure callback runs on this
    /// thread and the waiter stays queued. Once clean, does nothing and
    /// never blocks.
    ///
    /// Shares the delivery ordering of [`build_succeeded`](Self::build_succeeded):
    /// a failure callback must not wait on another thread that reports an
    /// event to this dirty gate.
    pub fn build_failed(&self) {
        if self.is_clean() {
            return;
        }
        let _delivery = self.dispatch.acquire();

        let notified: Vec<OnFailure> = {
            let mut state = self.lock_state();
            if state.clean {
                return;
            }
            state.last_result_was_failure = true;
            state.failure_epoch += 1;
            state
                .pending
                .iter()
                .map(|waiter| Arc::clone(&waiter.on_failure))
                .collect()
        };

        debug!(
            project = %self.project,
            waiters = notified.len(),
            "build failed before cache was cleared"
        );

        let mut first_panic = None;
        for on_failure in notified {
            // Only a callback on this thread can have cleaned the gate since
            // the snapshot; its waiters have already been released.
            if self.is_clean() {
                break;
            }
            run_captured(|| on_failure(), &mut first_panic);
        }
        resume(first_panic);
    }

    /// Whether the cache has been cleared.
    pub fn is_clean(&self) -> bool {
        self.lock_state().clean
    }

    /// Run `on_clean` once the cache is clean, reporting failures observed
    /// until then through `on_failure`.
    ///
    /// Either callback may run synchronously before this returns. A panic in
    /// an immediate `on_failure` is re-raised only after the waiter has been
    /// queued.
    pub fn wait_until_clean<C, F>(&self, on_clean: C, on_failure: F) -> WaiterId
    where
        C: FnOnce() + Send + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let id = WaiterId(self.next_waiter.fetch_add(1, Ordering::Relaxed));
        let on_failure: OnFailure = Arc::new(on_failure);
        let mut on_clean: Option<OnClean> = Some(Box::new(on_clean));
        let mut reported_epoch = 0;
        let mut first_panic = None;

        // Each pass either finishes registration or reports one failure
        // outside the lock and re-checks, so no failure is missed or sent
        // after success.
        loop {
            let mut state = self.lock_state();

            if state.clean {
                drop(state);
                debug!(project = %self.project, waiter = %id, "cache already clean");
                if let Some(callback) = on_clean.take() {
                    run_captured(callback, &mut first_panic);
                }
                break;
            }

            if state.last_result_was_failure && state.failure_epoch != reported_epoch {
                reported_epoch = state.failure_epoch;
                drop(state);
                debug!(project = %self.project, waiter = %id, "reporting earlier failure");
                run_captured(|| on_failure(), &mut first_panic);
                continue;
            }

            if let Some(callback) = on_clean.take() {
                state.pending.push(Waiter {
                    id,
                    on_clean: callback,
                    on_failure: Arc::clone(&on_failure),
                });
                debug!(
                    project = %self.project,
                    waiter = %id,
                    pending = state.pending.len(),
                    "waiting for clean cache"
                );
            }
            break;
        }

        resume(first_panic);
        id
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.lock_state();
        GateSnapshot {
            project: self.project.clone(),
            clean: state.clean,
            last_result_was_failure: state.last_result_was_failure,
            pending_waiters: state.pending.len(),
            failures_observed: state.failure_epoch,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        // Callbacks never run under this lock, so poisoning can only come
        // from the clear action, which commits nothing before it returns.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResourceCacheGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ResourceCacheGate")
            .field("project", &self.project)
            .field("clean", &state.clean)
            .field("last_result_was_failure", &state.last_result_was_failure)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(c: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
        let c = Arc::clone(c);
        move || {
            c.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_gate_is_dirty() {
        let gate = ResourceCacheGate::new(|| {});
        let snap = gate.snapshot();
        assert!(!snap.clean);
        assert!(!snap.last_result_was_failure);
        assert_eq!(snap.pending_waiters, 0);
        assert_eq!(snap.project, "default");
    }

    #[test]
    fn test_clear_action_runs_once() {
        let clears = counter();
        let gate = ResourceCacheGate::new(bump(&clears));
        gate.build_succeeded();
        gate.build_succeeded();
        gate.clear_cache_if_necessary();
        assert_eq!(clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_after_clean_is_noop() {
        let gate = ResourceCacheGate::new(|| {});
        gate.build_succeeded();
        gate.build_failed();
        let snap = gate.snapshot();
        assert!(snap.clean);
        assert!(!snap.last_result_was_failure);
        assert_eq!(snap.failures_observed, 0);
    }

    #[test]
    fn test_pending_drained_on_clean() {
        let gate = ResourceCacheGate::new(|| {});
        gate.wait_until_clean(|| {}, || {});
        gate.wait_until_clean(|| {}, || {});
        assert_eq!(gate.snapshot().pending_waiters, 2);
        gate.build_succeeded();
        assert_eq!(gate.snapshot().pending_waiters, 0);
    }

    #[test]
    fn test_waiter_ids_increase() {
        let gate = ResourceCacheGate::new(|| {});
        let a = gate.wait_until_clean(|| {}, || {});
        let b = gate.wait_until_clean(|| {}, || {});
        assert!(b > a);
    }

    #[test]
    fn test_success_callbacks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let gate = ResourceCacheGate::new(|| {});
        for i in 0..4 {
            let order = Arc::clone(&order);
            gate.wait_until_clean(move || order.lock().unwrap().push(i), || {});
        }
        gate.build_succeeded();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panicking_clear_action_leaves_gate_dirty() {
        let attempts = counter();
        let gate = {
            let attempts = Arc::clone(&attempts);
            ResourceCacheGate::new(move || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("disk full");
                }
            })
        };
        let released = counter();
        gate.wait_until_clean(bump(&released), || {});

        let first = panic::catch_unwind(AssertUnwindSafe(|| gate.build_succeeded()));
        assert!(first.is_err());
        assert!(!gate.is_clean());
        assert_eq!(gate.snapshot().pending_waiters, 1);

        gate.build_succeeded();
        assert!(gate.is_clean());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_immediate_failure_still_queues() {
        let gate = ResourceCacheGate::new(|| {});
        gate.build_failed();

        let released = counter();
        let on_clean = bump(&released);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            gate.wait_until_clean(on_clean, || panic!("assertion in failure handler"));
        }));
        assert!(result.is_err());
        assert_eq!(gate.snapshot().pending_waiters, 1);

        gate.build_succeeded();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_does_not_deadlock() {
        let gate = ResourceCacheGate::for_project("app", || {});
        let rendered = format!("{:?}", gate);
        assert!(rendered.contains("app"));
    }
}
