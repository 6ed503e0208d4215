use super::error::RecordError;
use super::media::MediaTime;
use super::recording_result::RecordingResult;

/// Mux sink lifecycle.
///
/// ```text
/// unknown → writing(origin) → completed
///        ↘        ↓
///           failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SinkStatus {
    Unknown,
    Writing { origin: MediaTime },
    Completed,
    Failed(RecordError),
}

impl SinkStatus {
    pub fn is_writing(&self) -> bool {
        matches!(self, Self::Writing { .. })
    }

    pub fn origin(&self) -> Option<MediaTime> {
        match self {
            Self::Writing { origin } => Some(*origin),
            _ => None,
        }
    }
}

/// Recording session state machine.
///
/// ```text
/// idle → starting → recording → stopping → completed / failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
    Completed(Box<RecordingResult>),
    Failed(RecordError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// A new session may begin from here.
    pub fn can_begin(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed(_) | Self::Failed(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_origin_only_while_writing() {
        assert_eq!(SinkStatus::Unknown.origin(), None);
        let origin = MediaTime::new(42, 1000);
        assert_eq!(SinkStatus::Writing { origin }.origin(), Some(origin));
        assert!(!SinkStatus::Completed.is_writing());
    }

    #[test]
    fn begin_allowed_after_terminal_states() {
        assert!(SessionState::Idle.can_begin());
        assert!(SessionState::Failed(RecordError::PermissionDenied).can_begin());
        assert!(!SessionState::Recording.can_begin());
        assert!(!SessionState::Stopping.can_begin());
    }
}
