//! RCH Resource Gate
//!
//! Holds back work that reads generated resources until the first
//! successful sync or build has cleared the project's resource cache.
//! Failed syncs/builds before that point are reported to waiting consumers
//! without dropping them, so they still run once the cache is clean.

pub mod cache;
pub mod config;
pub mod gate;
pub mod logging;
pub mod project;
pub mod replay;

pub use cache::{CacheClearer, GeneratedResourceCache};
pub use config::{ConfigError, EffectiveConfig, GateConfig};
pub use gate::{GateSnapshot, OnClean, OnFailure, ResourceCacheGate, WaiterId};
pub use project::{deliver, ProjectGates};
pub use rch_build_events::{BuildEvent, EventOutcome, EventSource};
pub use replay::{replay, CallbackKind, ReplayError, ReplayReport, TranscriptEntry};
