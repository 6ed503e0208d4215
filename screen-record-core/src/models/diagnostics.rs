use serde::{Deserialize, Serialize};

use super::media::{MediaTime, TrackKind};

/// Why a sample never reached its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The sink has not started writing yet (no video sample seen).
    SinkNotWriting,
    /// The track reported it is not ready for more data.
    TrackNotReady,
    /// The track was already marked finished.
    TrackFinished,
    /// The raw audio buffer could not be converted.
    ConversionFailed,
    /// The sample is timestamped before the writing origin.
    BeforeSessionStart,
    /// The sink rejected the append.
    AppendFailed,
    /// No session is running.
    SessionInactive,
}

/// One dropped sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    pub track: TrackKind,
    pub reason: DropReason,
    pub pts: Option<MediaTime>,
}

/// Per-track append and drop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStats {
    pub samples_appended: u64,
    pub samples_dropped: u64,
    /// Frames for audio, access units for video.
    pub frames_appended: u64,
}

/// Counters for a session, reset on every `begin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    pub video: TrackStats,
    pub microphone: TrackStats,
    pub application: TrackStats,
    /// Most recent drops, oldest first.
    pub recent_drops: Vec<DropEvent>,
}

impl SessionDiagnostics {
    pub fn track(&self, kind: TrackKind) -> &TrackStats {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Microphone => &self.microphone,
            TrackKind::Application => &self.application,
        }
    }

    pub fn track_mut(&mut self, kind: TrackKind) -> &mut TrackStats {
        match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Microphone => &mut self.microphone,
            TrackKind::Application => &mut self.application,
        }
    }

    pub fn total_dropped(&self) -> u64 {
        self.video.samples_dropped + self.microphone.samples_dropped + self.application.samples_dropped
    }
}
