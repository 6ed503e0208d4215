use crate::models::diagnostics::DropEvent;
use crate::models::error::RecordError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::SessionState;

/// Event delegate for recording session notifications.
///
/// Methods are called from whichever thread drove the event: the capture
/// source's thread for video, the caller's thread for audio feeds and
/// begin/end. Implementations should marshal to a UI thread if needed.
pub trait RecordingDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, _state: &SessionState) {}

    /// Called once per `begin` with the capture permission outcome.
    fn on_permission(&self, error: Option<&RecordError>);

    /// Called for setup and capture-pipeline errors.
    fn on_error(&self, error: &RecordError);

    /// Called for every sample that did not reach its track.
    fn on_sample_dropped(&self, _event: &DropEvent) {}

    /// Called when the output file is finalized.
    fn on_recording_finished(&self, result: &RecordingResult);
}
