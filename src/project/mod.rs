//! Per-project gates
//!
//! One gate per open project. A gate is created dirty when its project is
//! opened and dropped, with any still-pending waiters, when the project is
//! closed. Build/sync events are routed by project id.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rch_build_events::BuildEvent;
use tracing::{debug, info};

use crate::cache::CacheClearer;
use crate::gate::ResourceCacheGate;

/// Deliver one build/sync event to `gate`.
///
/// Sync and build completions are treated alike.
pub fn deliver(gate: &ResourceCacheGate, event: &BuildEvent) {
    if event.is_success() {
        gate.build_succeeded();
    } else {
        gate.build_failed();
    }
}

/// Registry of the gates of all open projects.
#[derive(Debug, Default)]
pub struct ProjectGates {
    gates: Mutex<BTreeMap<String, Arc<ResourceCacheGate>>>,
}

impl ProjectGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate for `project`, creating a dirty one if the project is not open.
    ///
    /// `clearer` is only used when a new gate is created.
    pub fn open<C: CacheClearer + 'static>(&self, project: &str, clearer: C) -> Arc<ResourceCacheGate> {
        let mut gates = self.gates();
        if let Some(gate) = gates.get(project) {
            return Arc::clone(gate);
        }

        info!(project = %project, "opening resource cache gate");
        let gate = ResourceCacheGate::shared(project, clearer);
        gates.insert(project.to_string(), Arc::clone(&gate));
        gate
    }

    /// Gate for an open project.
    pub fn get(&self, project: &str) -> Option<Arc<ResourceCacheGate>> {
        self.gates().get(project).cloned()
    }

    /// Close `project`, dropping its gate. Returns whether it was open.
    pub fn close(&self, project: &str) -> bool {
        let removed = self.gates().remove(project);
        match removed {
            Some(gate) => {
                debug!(
                    project = %project,
                    pending = gate.snapshot().pending_waiters,
                    "closing resource cache gate"
                );
                true
            }
            None => false,
        }
    }

    /// Ids of all open projects, sorted.
    pub fn projects(&self) -> Vec<String> {
        self.gates().keys().cloned().collect()
    }

    /// Route `event` to its project's gate. Returns false when the project
    /// is not open.
    ///
    /// Callbacks run on this thread after the registry lock is released.
    pub fn dispatch(&self, event: &BuildEvent) -> bool {
        let Some(gate) = self.get(&event.project) else {
            debug!(event = %event, "no gate for project, event dropped");
            return false;
        };
        deliver(&gate, event);
        true
    }

    fn gates(&self) -> MutexGuard<'_, BTreeMap<String, Arc<ResourceCacheGate>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rch_build_events::EventSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_open_returns_same_gate() {
        let registry = ProjectGates::new();
        let a = registry.open("app", || {});
        let b = registry.open("app", || {
            panic!("second clearer must not be used");
        });
        assert!(Arc::ptr_eq(&a, &b));
        b.build_succeeded();
        assert!(a.is_clean());
    }

    #[test]
    fn test_dispatch_routes_by_project() {
        let registry = ProjectGates::new();
        let app = registry.open("app", || {});
        let lib = registry.open("lib", || {});

        assert!(registry.dispatch(&BuildEvent::failed("app", EventSource::Sync)));
        assert!(registry.dispatch(&BuildEvent::succeeded("lib", EventSource::Build)));

        assert!(!app.is_clean());
        assert!(app.snapshot().last_result_was_failure);
        assert!(lib.is_clean());
    }

    #[test]
    fn test_dispatch_unknown_project() {
        let registry = ProjectGates::new();
        assert!(!registry.dispatch(&BuildEvent::succeeded("ghost", EventSource::Sync)));
    }

    #[test]
    fn test_close_drops_pending_waiters() {
        let registry = ProjectGates::new();
        let released = Arc::new(AtomicUsize::new(0));
        {
            let gate = registry.open("app", || {});
            let released = Arc::clone(&released);
            gate.wait_until_clean(
                move || {
                    released.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            );
        }

        assert!(registry.close("app"));
        assert!(!registry.close("app"));
        assert!(registry.get("app").is_none());

        // Reopening starts dirty with no waiters.
        let gate = registry.open("app", || {});
        assert!(!gate.is_clean());
        gate.build_succeeded();
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_projects_sorted() {
        let registry = ProjectGates::new();
        registry.open("zeta", || {});
        registry.open("alpha", || {});
        assert_eq!(registry.projects(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        let registry = Arc::new(ProjectGates::new());
        let gate = registry.open("app", || {});
        let opened = Arc::new(AtomicUsize::new(0));
        {
            let registry = Arc::clone(&registry);
            let opened = Arc::clone(&opened);
            gate.wait_until_clean(
                move || {
                    registry.open("follow-up", || {});
                    opened.fetch_add(1, Ordering::SeqCst);
                },
                || {},
            );
        }

        registry.dispatch(&BuildEvent::succeeded("app", EventSource::Build));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(registry.get("follow-up").is_some());
    }
}
