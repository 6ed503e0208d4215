use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::diagnostics::SessionDiagnostics;
use super::error::RecordError;
use super::media::{FrameSize, TrackKind};

/// Result returned when a session finalizes its output file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
    pub diagnostics: SessionDiagnostics,
    /// Outcome of the media library save; `None` when it was not requested.
    pub gallery: Option<Result<PathBuf, RecordError>>,
}

/// Metadata stored alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub created_at: String,
    pub frame_size: FrameSize,
    pub tracks: Vec<TrackKind>,
    pub samples_dropped: u64,
}

impl RecordingMetadata {
    pub fn new(
        duration_secs: f64,
        file_path: &str,
        checksum: &str,
        frame_size: FrameSize,
        tracks: Vec<TrackKind>,
        samples_dropped: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            duration_secs,
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            frame_size,
            tracks,
            samples_dropped,
        }
    }
}
