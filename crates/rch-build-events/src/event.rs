//! Build/sync completion event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which part of the pipeline produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Project sync (model import plus source generation)
    #[default]
    Sync,
    /// Full build
    Build,
}

impl EventSource {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Build => "build",
        }
    }
}

/// How the sync or build finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Succeeded,
    Failed,
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One completed sync or build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Project the event belongs to
    pub project: String,

    /// Producer of the event
    #[serde(default)]
    pub source: EventSource,

    /// Outcome
    pub outcome: EventOutcome,

    /// When the sync/build finished
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,

    /// Free-form detail (e.g. the source generation error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BuildEvent {
    /// Create a successful event stamped now.
    pub fn succeeded(project: impl Into<String>, source: EventSource) -> Self {
        Self::new(project, source, EventOutcome::Succeeded)
    }

    /// Create a failed event stamped now.
    pub fn failed(project: impl Into<String>, source: EventSource) -> Self {
        Self::new(project, source, EventOutcome::Failed)
    }

    fn new(project: impl Into<String>, source: EventSource, outcome: EventOutcome) -> Self {
        Self {
            project: project.into(),
            source,
            outcome,
            at: Utc::now(),
            detail: None,
        }
    }

    /// Attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether the sync/build succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == EventOutcome::Succeeded
    }
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.project, self.source.as_str(), self.outcome)
    }
}
