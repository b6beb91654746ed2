//! Ordering of event fan-outs.
//!
//! Success and failure notifications of one gate are delivered one event at
//! a time, so a failure fan-out that started before a concurrent success
//! finishes before any success callback runs. The lock is re-entrant per
//! thread: a callback that reports another event on its own thread proceeds
//! immediately.
//!
//! The state lock is never held while waiting here.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// Re-entrant lock serializing event delivery.
#[derive(Debug, Default)]
pub(crate) struct DispatchLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

/// Held while an event is being delivered. Released on drop, including
/// when a callback unwinds.
#[derive(Debug)]
pub(crate) struct DispatchGuard<'a> {
    lock: &'a DispatchLock,
}

impl DispatchLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter event delivery, waiting while another thread is delivering.
    pub(crate) fn acquire(&self) -> DispatchGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner();

        loop {
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    break;
                }
                Some(holder) if holder == me => {
                    owner.depth += 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        DispatchGuard { lock: self }
    }

    /// Whether some thread is currently delivering an event.
    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.owner().thread.is_some()
    }

    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.lock.owner();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.lock.released.notify_one();
        }
    }
}
