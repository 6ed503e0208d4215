//! # screen-record-core
//!
//! Screen recording with caller-supplied audio.
//!
//! A [`RecordingSession`] starts a platform [`CaptureSource`] for video and
//! accepts microphone and application PCM buffers pushed by the caller. The
//! [`AudioSampleAdapter`] turns each buffer into a timed sample unit, and all
//! three streams are multiplexed into one MP4 file by a [`MediaSink`].
//!
//! ## Architecture
//!
//! ```text
//! screen-record-core (this crate)
//! ├── traits/       ← CaptureSource, MediaSink, SinkFactory, MediaLibrary, HostClock, RecordingDelegate
//! ├── models/       ← RecordError, SessionState, SessionConfiguration, MediaTime, PcmBuffer, etc.
//! ├── processing/   ← AudioSampleAdapter, PCM conversion, RingBuffer
//! ├── session/      ← RecordingSession (begin / feed / end)
//! └── storage/      ← Mp4Sink, destination resolution, gallery, checksum, metadata
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{SessionConfiguration, TimestampPolicy};
pub use models::diagnostics::{DropEvent, DropReason, SessionDiagnostics, TrackStats};
pub use models::error::{ConversionError, RecordError};
pub use models::media::{
    AudioFormat, FrameSize, MediaTime, PcmBuffer, PcmData, SampleUnit, TrackKind, VideoCodec, VideoSample,
};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{SessionState, SinkStatus};
pub use processing::audio_adapter::AudioSampleAdapter;
pub use processing::ring_buffer::RingBuffer;
pub use session::recording::RecordingSession;
pub use storage::gallery::DirectoryLibrary;
pub use storage::mp4_writer::{Mp4Sink, Mp4SinkFactory};
pub use traits::capture_source::{CaptureErrorCallback, CaptureSource, VideoSampleCallback};
pub use traits::host_clock::{HostClock, MonotonicClock};
pub use traits::media_library::MediaLibrary;
pub use traits::media_sink::{MediaSink, SinkFactory};
pub use traits::recording_delegate::RecordingDelegate;
