use std::sync::Arc;

use crate::models::error::RecordError;
use crate::models::media::{FrameSize, VideoSample};
use crate::traits::host_clock::HostClock;

/// Callback invoked for every captured video sample.
///
/// Timestamps must come from the clock passed to [`CaptureSource::start`].
pub type VideoSampleCallback = Arc<dyn Fn(VideoSample) + Send + Sync + 'static>;

/// Callback invoked when the capture pipeline fails after starting.
pub type CaptureErrorCallback = Arc<dyn Fn(RecordError) + Send + Sync + 'static>;

/// A platform screen capture service.
///
/// Owned by one session; nothing about it is process-global from the
/// session's point of view. Audio is never taken from the source: callers
/// push microphone and application buffers themselves.
pub trait CaptureSource: Send + Sync {
    /// Whether capture can be started at all on this device.
    fn is_available(&self) -> bool;

    /// Current display size, used when the session is given no frame size.
    fn display_size(&self) -> FrameSize;

    /// Start streaming video samples stamped with `clock`.
    ///
    /// `clock` is the session's clock, which also stamps audio buffers that
    /// carry no host time. Returns `Err(RecordError::PermissionDenied)` when
    /// the user refused capture. Callbacks fire on the source's own thread.
    fn start(
        &mut self,
        clock: Arc<dyn HostClock>,
        on_video: VideoSampleCallback,
        on_error: CaptureErrorCallback,
    ) -> Result<(), RecordError>;

    /// Stop streaming. No callbacks fire after this returns.
    fn stop(&mut self) -> Result<(), RecordError>;
}
