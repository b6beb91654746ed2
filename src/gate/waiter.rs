//! Waiter registrations and callback fan-out.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Success callback. Runs at most once, so it may consume its captures.
pub type OnClean = Box<dyn FnOnce() + Send + 'static>;

/// Failure callback. Shared so it can be invoked outside the state lock on
/// every failure event while the waiter stays queued.
pub type OnFailure = Arc<dyn Fn() + Send + Sync + 'static>;

/// Identifier handed back by `wait_until_clean`, unique per gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(pub u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// A queued (on_clean, on_failure) pair.
pub(crate) struct Waiter {
    pub(crate) id: WaiterId,
    pub(crate) on_clean: OnClean,
    pub(crate) on_failure: OnFailure,
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Payload of a panicking callback, held until the fan-out completes.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Run `callback`, capturing a panic instead of unwinding through the
/// caller. The first captured payload is kept in `first_panic`.
pub(crate) fn run_captured<F: FnOnce()>(callback: F, first_panic: &mut Option<PanicPayload>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        first_panic.get_or_insert(payload);
    }
}

/// Invoke every callback, then re-raise the first panic, if any.
///
/// A panicking callback does not starve the ones after it.
pub(crate) fn run_all<I, F>(callbacks: I)
where
    I: IntoIterator<Item = F>,
    F: FnOnce(),
{
    let mut first_panic = None;
    for callback in callbacks {
        run_captured(callback, &mut first_panic);
    }
    resume(first_panic);
}

pub(crate) fn resume(first_panic: Option<PanicPayload>) {
    if let Some(payload) = first_panic {
        panic::resume_unwind(payload);
    }
}
