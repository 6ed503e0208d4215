use std::path::{Path, PathBuf};

use crate::models::error::RecordError;

/// The device's photo/video library.
pub trait MediaLibrary: Send + Sync {
    /// Ask for write access. Returns whether it was granted.
    fn request_access(&self) -> bool;

    /// Save a finished video, returning where the library stored it.
    fn save_video(&self, path: &Path) -> Result<PathBuf, RecordError>;
}
