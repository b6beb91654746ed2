//! RCH Build Events
//!
//! Completion events emitted by the build/sync orchestrator. Each event
//! reports that a sync or build for one project finished, successfully or
//! not. Events travel as JSON lines so they can be recorded and replayed.

pub mod error;
pub mod event;
pub mod stream;

pub use error::{EventError, EventResult};
pub use event::{BuildEvent, EventOutcome, EventSource};
pub use stream::{parse_events, parse_events_str};
