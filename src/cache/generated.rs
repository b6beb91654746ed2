//! On-disk generated-resource cache
//!
//! Layout: <cache.root>/<project>/<cache.generated_dir>/...
//!
//! Clearing removes the whole directory tree and, unless disabled,
//! recreates it empty so later writers find it in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::CacheClearer;
use crate::config::GateConfig;

/// Directory of generated resources belonging to one project.
///
/// Clones share the clear counter.
#[derive(Debug, Clone)]
pub struct GeneratedResourceCache {
    dir: PathBuf,
    recreate: bool,
    clears: Arc<AtomicUsize>,
}

impl GeneratedResourceCache {
    /// Cache rooted at `dir`, recreated empty after each clear.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            recreate: true,
            clears: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cache for `project` laid out per `config`.
    pub fn for_project(config: &GateConfig, project: &str) -> Self {
        Self::new(config.generated_dir_for(project)).with_recreate(config.cache.recreate)
    }

    /// Set whether the directory is recreated after clearing.
    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of times `clear` has run.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn remove_tree(&self) -> io::Result<bool> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl CacheClearer for GeneratedResourceCache {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);

        match self.remove_tree() {
            Ok(true) => debug!(dir = %self.dir.display(), "removed generated resources"),
            Ok(false) => debug!(dir = %self.dir.display(), "no generated resources to remove"),
            Err(e) => warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to remove generated resources"
            ),
        }

        if self.recreate {
            if let Err(e) = fs::create_dir_all(&self.dir) {
                warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "failed to recreate generated resource directory"
                );
            }
        }
    }
}
