use thiserror::Error;

/// Errors surfaced by a recording session.
///
/// Only setup, permission and finalize failures ever reach the caller.
/// Per-sample failures are counted in the session diagnostics instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("screen capture permission denied")]
    PermissionDenied,

    /// The one condition this crate raises itself: the media library refused access.
    #[error("media library access not granted")]
    LibraryAccessDenied,

    #[error("capture source not available")]
    SourceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("sink creation failed: {0}")]
    SinkCreationFailed(String),

    #[error("capture start failed: {0}")]
    CaptureStartFailed(String),

    #[error("append failed: {0}")]
    AppendFailed(String),

    #[error("finalize failed: {0}")]
    FinalizeFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Why a raw PCM buffer could not be turned into a sample unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("format description: {0}")]
    FormatDescription(String),

    #[error("sample allocation: {0}")]
    Allocation(String),

    #[error("payload population: {0}")]
    Population(String),
}
