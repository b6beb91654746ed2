//! Generated-resource cache clearing
//!
//! The gate treats clearing as an opaque, idempotent action invoked at most
//! once per gate. Anything callable with no arguments can serve as the
//! action; `GeneratedResourceCache` clears an on-disk directory.

mod generated;

pub use generated::GeneratedResourceCache;

/// Clears (or regenerates) a resource cache.
///
/// Failures are reported by the implementation itself, never to the gate.
/// Implementations must not call back into the gate that owns them.
pub trait CacheClearer: Send + Sync {
    fn clear(&self);
}

impl<F> CacheClearer for F
where
    F: Fn() + Send + Sync,
{
    fn clear(&self) {
        self()
    }
}
