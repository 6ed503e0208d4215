use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::media::{AudioFormat, FrameSize, VideoCodec};

/// Where audio sample units get their presentation timestamp from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Use the buffer's host time; read the clock only when it is absent.
    #[default]
    HostTimeOrClock,
    /// Always stamp with the clock reading at conversion time.
    Clock,
}

/// Configuration for one recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfiguration {
    /// Explicit output file. `None` resolves to `screen_recording.mp4` in the output directory.
    pub destination: Option<PathBuf>,

    /// Video dimensions. `None` uses the capture source's display size.
    pub frame_size: Option<FrameSize>,

    /// Copy the finished file into the attached media library.
    pub save_to_gallery: bool,

    /// Directory for the default destination. `None` uses the user's documents directory.
    pub output_directory: Option<PathBuf>,

    /// Codec of the video track (default: H.264).
    pub video_codec: VideoCodec,

    /// Format of both audio tracks (default: mono, 16 kHz, 16-bit).
    pub audio_format: AudioFormat,

    pub timestamp_policy: TimestampPolicy,

    /// Register the microphone track (default: true).
    pub enable_microphone: bool,

    /// Register the application audio track (default: true).
    pub enable_application_audio: bool,

    /// Write `<output>.metadata.json` next to the recording (default: false).
    pub write_metadata: bool,

    /// How many recent drop events diagnostics keep.
    pub drop_history: usize,
}

impl SessionConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(size) = self.frame_size {
            if !size.is_valid() {
                return Err(format!("invalid frame size: {}x{}", size.width, size.height));
            }
        }
        if let Some(ref dest) = self.destination {
            if dest.as_os_str().is_empty() || dest.file_name().is_none() {
                return Err(format!("invalid destination: {}", dest.display()));
            }
        }
        if self.audio_format.sample_rate <= 0.0 {
            return Err("audio sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.audio_format.channels) {
            return Err(format!("unsupported audio channel count: {}", self.audio_format.channels));
        }
        if self.audio_format.bits_per_channel != 16 || self.audio_format.is_float {
            return Err("audio tracks are stored as 16-bit integer PCM".into());
        }
        Ok(())
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            destination: None,
            frame_size: None,
            save_to_gallery: false,
            output_directory: None,
            video_codec: VideoCodec::H264,
            audio_format: AudioFormat::track_default(),
            timestamp_policy: TimestampPolicy::default(),
            enable_microphone: true,
            enable_application_audio: true,
            write_metadata: false,
            drop_history: 64,
        }
    }
}
