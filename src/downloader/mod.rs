pub mod cache;
pub mod delivery;
pub mod extractor;
pub mod manager;
pub mod progress;
pub mod tool;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use crate::api::TrackDescriptor;

/// A file produced by the downloader, paired with the track it came from.
///
/// The value owns the file on disk, and the per-download scratch directory
/// around it when there is one: both are removed by [`DownloadedFile::remove`]
/// or, failing that, when the value is dropped. Either way removal happens once.
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
    extension: String,
    track: TrackDescriptor,
    scratch_dir: Option<PathBuf>,
    removed: bool,
}

impl DownloadedFile {
    pub fn new(path: PathBuf, track: TrackDescriptor) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self { path, extension, track, scratch_dir: None, removed: false }
    }

    /// A file living in a directory that belongs to this download alone.
    pub fn in_scratch_dir(path: PathBuf, track: TrackDescriptor, scratch_dir: PathBuf) -> Self {
        let mut file = Self::new(path, track);
        file.scratch_dir = Some(scratch_dir);
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn track(&self) -> &TrackDescriptor {
        &self.track
    }

    pub fn title(&self) -> &str {
        &self.track.title
    }

    pub fn performer(&self) -> &str {
        &self.track.artist
    }

    /// Deletes the file now instead of waiting for drop.
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => log::debug!("🗑️ [CLEANUP] Removed {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("⚠️ [CLEANUP] Failed to remove {:?}: {}", self.path, e),
        }
        if let Some(dir) = self.scratch_dir.take() {
            remove_scratch_dir(&dir).await;
        }
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("🗑️ [CLEANUP] Removed {:?} on drop", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("⚠️ [CLEANUP] Failed to remove {:?}: {}", self.path, e),
        }
        if let Some(dir) = self.scratch_dir.take() {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("⚠️ [CLEANUP] Failed to remove {:?}: {}", dir, e),
            }
        }
    }
}

/// Removes a download's scratch directory along with any fragments left in it.
pub(crate) async fn remove_scratch_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => log::debug!("🗑️ [CLEANUP] Removed scratch directory {:?}", dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("⚠️ [CLEANUP] Failed to remove {:?}: {}", dir, e),
    }
}
