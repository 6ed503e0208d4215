use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;

/// File name used when the caller gives no explicit destination.
pub const DEFAULT_FILE_NAME: &str = "screen_recording.mp4";

/// Directory holding default recordings: the user's documents directory,
/// or the temp directory on systems without one.
pub fn default_output_directory() -> PathBuf {
    dirs_next::document_dir().unwrap_or_else(std::env::temp_dir)
}

/// Resolve the session's output location.
///
/// An explicit destination is used as-is. Otherwise the file is
/// `DEFAULT_FILE_NAME` inside `output_directory` (or the default directory),
/// which is created if missing. Either way a pre-existing file at the
/// resolved path is removed.
pub fn resolve_destination(explicit: Option<&Path>, output_directory: Option<&Path>) -> Result<PathBuf, RecordError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let dir = output_directory
                .map(Path::to_path_buf)
                .unwrap_or_else(default_output_directory);
            fs::create_dir_all(&dir)
                .map_err(|e| RecordError::StorageError(format!("failed to create {}: {}", dir.display(), e)))?;
            dir.join(DEFAULT_FILE_NAME)
        }
    };

    remove_existing(&path)?;
    Ok(path)
}

fn remove_existing(path: &Path) -> Result<(), RecordError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed previous recording at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecordError::StorageError(format!(
            "failed to remove existing file {}: {}",
            path.display(),
            e
        ))),
    }
}
