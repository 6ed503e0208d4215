use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;
use crate::traits::media_library::MediaLibrary;

/// A media library backed by a plain directory.
///
/// Saved videos are copied in under a unique name, so repeated saves of the
/// same default-named recording never collide.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
    access_granted: bool,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            access_granted: true,
        }
    }

    /// A library that refuses access, for users who declined the prompt.
    pub fn denied(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            access_granted: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn request_access(&self) -> bool {
        self.access_granted
    }

    fn save_video(&self, path: &Path) -> Result<PathBuf, RecordError> {
        if !self.access_granted {
            return Err(RecordError::LibraryAccessDenied);
        }

        fs::create_dir_all(&self.root)
            .map_err(|e| RecordError::StorageError(format!("failed to create library: {}", e)))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let target = self
            .root
            .join(format!("recording_{}.{}", uuid::Uuid::new_v4(), extension));
        fs::copy(path, &target)
            .map_err(|e| RecordError::StorageError(format!("failed to copy into library: {}", e)))?;

        log::info!("Saved {} to library as {}", path.display(), target.display());
        Ok(target)
    }
}
