//! Saved recordings on disk.
//!
//! A recording counts as saved once `save_session` has written its
//! `<id>.json` metadata next to the audio. Entries whose session WAV has
//! since disappeared are left out of listings.

use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::stats::RecordingMetadata;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone)]
pub struct RecordingLibrary {
    root: PathBuf,
}

impl RecordingLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    /// Saved recordings, newest first
    pub async fn list(&self) -> SessionResult<Vec<RecordingMetadata>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut recordings = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_metadata(&path).await {
                Ok(metadata) if audio_exists(&metadata).await => recordings.push(metadata),
                Ok(metadata) => info!("Skipping {}: audio file is gone", metadata.id),
                Err(e) => warn!("Ignoring unreadable metadata {}: {}", path.display(), e),
            }
        }

        recordings.sort_by_key(|r| std::cmp::Reverse(started_at(r)));
        Ok(recordings)
    }

    pub async fn get(&self, id: &str) -> SessionResult<RecordingMetadata> {
        let path = self.checked_metadata_path(id)?;
        match read_metadata(&path).await {
            Ok(metadata) => Ok(metadata),
            Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::RecordingNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Full-session WAV bytes of a saved recording
    pub async fn audio(&self, id: &str) -> SessionResult<Vec<u8>> {
        let metadata = self.get(id).await?;
        let path = metadata
            .file_path
            .ok_or_else(|| SessionError::RecordingNotFound(id.to_string()))?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::RecordingNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the audio, its segments and the metadata record
    pub async fn delete(&self, id: &str) -> SessionResult<RecordingMetadata> {
        let metadata = self.get(id).await?;

        let audio = metadata
            .file_path
            .iter()
            .chain(metadata.segment_files.iter());
        for path in audio {
            remove_if_present(path).await;
        }
        tokio::fs::remove_file(self.metadata_path(id)).await?;

        info!("Deleted saved recording {} ('{}')", metadata.id, metadata.name);
        Ok(metadata)
    }

    /// Ids are file stems; anything that could leave the directory is unknown
    fn checked_metadata_path(&self, id: &str) -> SessionResult<PathBuf> {
        let plain = !id.is_empty()
            && !id.contains(['/', '\\'])
            && id != "."
            && id != "..";
        if !plain {
            return Err(SessionError::RecordingNotFound(id.to_string()));
        }
        Ok(self.metadata_path(id))
    }
}

async fn read_metadata(path: &Path) -> SessionResult<RecordingMetadata> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Unparseable timestamps sort last
fn started_at(metadata: &RecordingMetadata) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(&metadata.timestamp).ok()
}

async fn audio_exists(metadata: &RecordingMetadata) -> bool {
    match &metadata.file_path {
        Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
        None => false,
    }
}

pub(crate) async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}
