use std::path::{Path, PathBuf};

use crate::models::error::RecordError;
use crate::models::media::{MediaTime, SampleUnit, TrackKind, TrackSettings};
use crate::models::state::SinkStatus;

/// A multiplexing writer that serializes several tracks into one container file.
///
/// The session serializes every call; implementations need no locking of their own.
pub trait MediaSink: Send {
    /// Register a track. Only valid before writing starts, once per kind.
    fn add_track(&mut self, kind: TrackKind, settings: TrackSettings) -> Result<(), RecordError>;

    fn status(&self) -> SinkStatus;

    /// Enter the writing state with `origin` as time zero.
    fn start_writing(&mut self, origin: MediaTime) -> Result<(), RecordError>;

    /// Whether the track accepts another sample right now.
    fn is_ready_for_more_data(&self, kind: TrackKind) -> bool;

    fn append(&mut self, kind: TrackKind, unit: SampleUnit) -> Result<(), RecordError>;

    /// Mark a track complete. It never receives samples afterwards.
    fn mark_finished(&mut self, kind: TrackKind);

    /// Finalize the container and return the output path.
    fn finish(&mut self) -> Result<PathBuf, RecordError>;

    fn output_path(&self) -> &Path;
}

/// Creates a sink for a resolved destination.
pub trait SinkFactory: Send + Sync {
    fn create(&self, destination: &Path) -> Result<Box<dyn MediaSink>, RecordError>;
}
