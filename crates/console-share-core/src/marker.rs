//! Transient marker file lifetime.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Removes the marker file when dropped.
///
/// Hold it for the whole process lifetime: returning from `main`, an error
/// propagated with `?`, and an unwinding panic all drop it.
#[derive(Debug)]
pub struct MarkerGuard {
    path: PathBuf,
}

impl MarkerGuard {
    /// Take ownership of `path`, creating its parent directory if needed.
    ///
    /// An announcement already present is left in place so discovery can
    /// pick it up; the file is only removed when the guard drops.
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Like [`MarkerGuard::new`], but clears a stale marker first.
    ///
    /// For callers that start the announcing process themselves, so an
    /// earlier run's announcement is never mistaken for the current one.
    pub fn fresh(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let guard = Self::new(path)?;
        guard.remove();
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed marker file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove marker file"),
        }
    }
}

impl Drop for MarkerGuard {
    fn drop(&mut self) {
        self.remove();
    }
}
