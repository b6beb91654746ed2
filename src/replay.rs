//! Event replay
//!
//! Feeds a recorded build/sync event stream through fresh per-project gates
//! and records which waiter callbacks fired on which event. Used by
//! `rch-gate replay` to check how consumers would have been notified.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rch_build_events::{parse_events, BuildEvent, EventError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::cache::GeneratedResourceCache;
use crate::config::{ConfigError, GateConfig};
use crate::gate::GateSnapshot;
use crate::project::ProjectGates;

/// Errors from the replay tooling.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid event stream: {0}")]
    Events(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

/// Which callback of a waiter fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Clean,
    Failure,
}

/// One callback invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Index of the triggering event (None when fired at registration)
    pub event: Option<usize>,
    pub project: String,
    pub callback: CallbackKind,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Events fed through the gates
    pub events: usize,
    /// Final state of every gate, sorted by project
    pub gates: Vec<GateSnapshot>,
    /// Callback invocations in the order they happened
    pub transcript: Vec<TranscriptEntry>,
}

impl ReplayReport {
    /// Final snapshot of `project`'s gate.
    pub fn gate(&self, project: &str) -> Option<&GateSnapshot> {
        self.gates.iter().find(|g| g.project == project)
    }

    /// Callbacks that fired for `project`.
    pub fn callbacks_for<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a TranscriptEntry> + 'a {
        self.transcript.iter().filter(move |e| e.project == project)
    }
}

/// Read a JSON-lines event file.
pub fn load_events(path: &Path) -> Result<Vec<BuildEvent>, ReplayError> {
    let file = File::open(path).map_err(|source| ReplayError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_events(BufReader::new(file))?)
}

/// Replay `events` in order.
///
/// A gate is opened for every project in `wait_for` and every project named
/// by an event. Each `wait_for` project gets one recording waiter before the
/// first event is delivered.
pub fn replay(config: &GateConfig, events: &[BuildEvent], wait_for: &[String]) -> ReplayReport {
    let registry = ProjectGates::new();
    let transcript = Arc::new(Mutex::new(Vec::new()));
    // 0 while registering, i + 1 while delivering event i
    let cursor = Arc::new(AtomicUsize::new(0));

    let projects = wait_for
        .iter()
        .map(String::as_str)
        .chain(events.iter().map(|e| e.project.as_str()));
    for project in projects {
        registry.open(project, GeneratedResourceCache::for_project(config, project));
    }

    for project in wait_for {
        let Some(gate) = registry.get(project) else {
            continue;
        };
        let on_clean = recorder(&transcript, &cursor, project, CallbackKind::Clean);
        let on_failure = recorder(&transcript, &cursor, project, CallbackKind::Failure);
        gate.wait_until_clean(on_clean, on_failure);
    }

    for (idx, event) in events.iter().enumerate() {
        cursor.store(idx + 1, Ordering::SeqCst);
        registry.dispatch(event);
    }

    let gates: Vec<GateSnapshot> = registry
        .projects()
        .iter()
        .filter_map(|p| registry.get(p))
        .map(|g| g.snapshot())
        .collect();
    let transcript = transcript
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    info!(
        events = events.len(),
        gates = gates.len(),
        callbacks = transcript.len(),
        "replay finished"
    );

    ReplayReport {
        events: events.len(),
        gates,
        transcript,
    }
}

fn recorder(
    transcript: &Arc<Mutex<Vec<TranscriptEntry>>>,
    cursor: &Arc<AtomicUsize>,
    project: &str,
    callback: CallbackKind,
) -> impl Fn() + Send + Sync + 'static {
    let transcript = Arc::clone(transcript);
    let cursor = Arc::clone(cursor);
    let project = project.to_string();
    move || {
        let entry = TranscriptEntry {
            event: cursor.load(Ordering::SeqCst).checked_sub(1),
            project: project.clone(),
            callback,
        };
        transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
