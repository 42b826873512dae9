//! Registry of temporary audio files.
//!
//! Every file the synthesis pipeline writes is registered here and is only
//! ever deleted through [`ResourceTracker::remove`]. Each tracked path owns a
//! dedicated lock so a file that is being played cannot be deleted underneath
//! the player. Files that survive until the tracker is dropped are deleted
//! on a best-effort basis.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::audio::{AudioArtifact, AudioFormat};

type FileLock = Arc<AsyncMutex<()>>;

/// Process-wide owner of temporary artifacts.
///
/// Construct one at startup and share it by reference (or `Arc`) with the
/// synthesizer and the player.
#[derive(Default)]
pub struct ResourceTracker {
    files: Mutex<HashMap<PathBuf, FileLock>>,
}

/// Holds a tracked file's lock. Removal of that file waits until this is dropped.
pub struct FileGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, FileLock>> {
        // A panic while holding the map lock cannot leave the map half-edited.
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking `path`. Registering a path that is already tracked is a no-op.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut files = self.files();
        if files.contains_key(&path) {
            debug!("Already tracking {}", path.display());
            return;
        }
        debug!("Tracking {}", path.display());
        files.insert(path, Arc::new(AsyncMutex::new(())));
    }

    /// Whether `path` is currently tracked.
    pub fn contains(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }

    /// Snapshot of every tracked path.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    /// Acquire the lock of a tracked file, waiting for any current holder.
    ///
    /// Returns `None` when the path is not tracked.
    pub async fn lock(&self, path: &Path) -> Option<FileGuard> {
        let lock = self.files().get(path).cloned()?;
        let guard = lock.lock_owned().await;
        Some(FileGuard { _guard: guard })
    }

    /// Delete a tracked file and forget it.
    ///
    /// Waits for the file's lock, deletes the file if it still exists, then
    /// drops the record. Failures are logged and swallowed. Removing an
    /// untracked path is a no-op.
    pub async fn remove(&self, path: &Path) {
        let Some(lock) = self.files().get(path).cloned() else {
            debug!("Not tracked, nothing to remove: {}", path.display());
            return;
        };

        let _guard = lock.lock().await;

        // While we waited, another remover may have finished, and the path may
        // even have been registered again under a fresh lock we do not hold.
        let still_ours = self
            .files()
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, &lock));
        if !still_ours {
            return;
        }

        match delete_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
        }

        self.files().remove(path);
    }

    /// Remove every tracked file.
    ///
    /// Works on a snapshot, so files registered while this runs are left for
    /// a later call.
    pub async fn cleanup_all(&self) {
        let paths = self.tracked_paths();
        if !paths.is_empty() {
            debug!("Cleaning up {} temporary files", paths.len());
        }
        for path in paths {
            self.remove(&path).await;
        }
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        let files = std::mem::take(self.files.get_mut().unwrap_or_else(|p| p.into_inner()));
        for path in files.into_keys() {
            if let Err(e) = delete_file(&path) {
                warn!("Failed to remove temporary file {} at shutdown: {}", path.display(), e);
            }
        }
    }
}

/// Creates tracked temporary artifacts inside one scratch directory.
#[derive(Clone)]
pub struct ArtifactStore {
    tracker: Arc<ResourceTracker>,
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(tracker: Arc<ResourceTracker>, dir: impl Into<PathBuf>) -> Self {
        Self {
            tracker,
            dir: dir.into(),
        }
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create_file(&self, format: AudioFormat) -> io::Result<(fs::File, AudioArtifact)> {
        fs::create_dir_all(&self.dir)?;
        let (file, path) = tempfile::Builder::new()
            .prefix("debatevoice-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(&self.dir)?
            .keep()?;
        self.tracker.register(&path);
        Ok((file, AudioArtifact::new(path, format)))
    }

    /// Create an empty tracked file for `format`.
    pub fn create(&self, format: AudioFormat) -> io::Result<AudioArtifact> {
        self.create_file(format).map(|(_, artifact)| artifact)
    }

    /// Create a tracked file holding `bytes`.
    pub fn write(&self, format: AudioFormat, bytes: &[u8]) -> io::Result<AudioArtifact> {
        let (mut file, artifact) = self.create_file(format)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(artifact)
    }

    /// Hand an artifact back to the tracker for deletion.
    pub async fn release(&self, artifact: &AudioArtifact) {
        self.tracker.remove(&artifact.path).await;
    }
}

fn delete_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
