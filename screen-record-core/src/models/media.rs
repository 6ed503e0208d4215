use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rational media timestamp: `value / timescale` seconds.
///
/// Comparison is by the time value, so `1/2` equals `2/4`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub const fn zero() -> Self {
        Self { value: 0, timescale: 1 }
    }

    /// Nanosecond-precision time from a `Duration`.
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            value: duration.as_nanos().min(i64::MAX as u128) as i64,
            timescale: 1_000_000_000,
        }
    }

    pub fn from_secs_f64(secs: f64, timescale: u32) -> Self {
        Self {
            value: (secs * timescale as f64).round() as i64,
            timescale,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    /// Convert to another timescale, rounding to nearest.
    pub fn rescale(&self, timescale: u32) -> i64 {
        if self.timescale == timescale {
            return self.value;
        }
        if self.timescale == 0 {
            return 0;
        }
        let num = self.value as i128 * timescale as i128;
        let den = self.timescale as i128;
        let half = den / 2;
        let rounded = if num >= 0 { (num + half) / den } else { (num - half) / den };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// `self - other`, expressed in `self`'s timescale.
    pub fn saturating_sub(&self, other: &MediaTime) -> MediaTime {
        let other_value = other.rescale(self.timescale);
        MediaTime::new(self.value.saturating_sub(other_value), self.timescale)
    }

    fn cross(&self, other: &MediaTime) -> (i128, i128) {
        (
            self.value as i128 * other.timescale as i128,
            other.value as i128 * self.timescale as i128,
        )
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = self.cross(other);
        a == b
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.cross(other);
        a.cmp(&b)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.6}s)", self.value, self.timescale, self.as_secs_f64())
    }
}

/// Video frame dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width <= u16::MAX as u32 && self.height <= u16::MAX as u32
    }
}

/// The three tracks a session can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Microphone,
    Application,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Video, TrackKind::Microphone, TrackKind::Application];

    pub fn is_audio(&self) -> bool {
        !matches!(self, Self::Video)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Microphone => "microphone",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video codec written into the container. Samples arrive already encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::H264 => b"avc1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub size: FrameSize,
}

/// Linear PCM layout descriptor, as delivered with a raw audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: f64,
    pub channels: u16,
    pub bits_per_channel: u16,
    pub is_float: bool,
    pub is_big_endian: bool,
    pub is_interleaved: bool,
}

impl AudioFormat {
    /// Signed 16-bit little-endian interleaved PCM.
    pub fn pcm_i16(sample_rate: f64, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_channel: 16,
            is_float: false,
            is_big_endian: false,
            is_interleaved: true,
        }
    }

    /// 32-bit float little-endian PCM.
    pub fn pcm_f32(sample_rate: f64, channels: u16, is_interleaved: bool) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_channel: 32,
            is_float: true,
            is_big_endian: false,
            is_interleaved,
        }
    }

    /// The fixed format of both audio tracks: mono, 16 kHz, 16-bit linear PCM.
    pub fn track_default() -> Self {
        Self::pcm_i16(16_000.0, 1)
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_channel as usize).div_ceil(8)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }
}

/// Per-track encoding settings handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrackSettings {
    Video(VideoSettings),
    Audio(AudioFormat),
}

/// Raw audio sample storage of a [`PcmBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PcmData {
    /// All channels interleaved frame by frame.
    Interleaved(Vec<u8>),
    /// One byte plane per channel.
    Planar(Vec<Vec<u8>>),
}

/// An untimed raw audio buffer supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub format: AudioFormat,
    pub frame_length: u32,
    pub data: PcmData,
    /// Capture time on the host clock, when the producer knows it.
    pub host_time: Option<MediaTime>,
}

impl PcmBuffer {
    pub fn new(format: AudioFormat, frame_length: u32, data: PcmData) -> Self {
        Self {
            format,
            frame_length,
            data,
            host_time: None,
        }
    }

    /// Interleaved signed 16-bit buffer; frame length is derived from the sample count.
    pub fn from_i16(sample_rate: f64, channels: u16, samples: &[i16]) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(
            AudioFormat::pcm_i16(sample_rate, channels),
            frames as u32,
            PcmData::Interleaved(data),
        )
    }

    /// Interleaved 32-bit float buffer.
    pub fn from_f32(sample_rate: f64, channels: u16, samples: &[f32]) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(
            AudioFormat::pcm_f32(sample_rate, channels, true),
            frames as u32,
            PcmData::Interleaved(data),
        )
    }

    pub fn with_host_time(mut self, host_time: MediaTime) -> Self {
        self.host_time = Some(host_time);
        self
    }
}

/// One encoded video access unit delivered by the capture source.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSample {
    pub pts: MediaTime,
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    /// Decoder configuration record (`avcC` body), present on at least the first keyframe.
    pub codec_config: Option<Vec<u8>>,
}

impl VideoSample {
    pub fn new(pts: MediaTime, data: Vec<u8>, is_keyframe: bool) -> Self {
        Self {
            pts,
            data,
            is_keyframe,
            codec_config: None,
        }
    }

    pub fn with_codec_config(mut self, config: Vec<u8>) -> Self {
        self.codec_config = Some(config);
        self
    }
}

/// Format description of an audio sample unit, derived from its buffer's [`AudioFormat`].
///
/// Payloads described by this are always interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormatDescription {
    pub format: AudioFormat,
    pub bytes_per_frame: u32,
    pub frames_per_packet: u32,
    pub bytes_per_packet: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleFormat {
    Audio(AudioFormatDescription),
    Video {
        is_keyframe: bool,
        codec_config: Option<Vec<u8>>,
    },
}

/// A timed, self-describing chunk of media ready to append to one track.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleUnit {
    pub format: SampleFormat,
    pub pts: MediaTime,
    /// Duration of one sample; for audio that is one frame (`1 / sample_rate`).
    pub duration: MediaTime,
    /// `None` means decode order equals presentation order.
    pub dts: Option<MediaTime>,
    pub sample_count: u32,
    pub data: Vec<u8>,
}

impl SampleUnit {
    pub fn audio_description(&self) -> Option<&AudioFormatDescription> {
        match &self.format {
            SampleFormat::Audio(desc) => Some(desc),
            SampleFormat::Video { .. } => None,
        }
    }

    /// Total presentation span of the unit.
    pub fn total_duration(&self) -> MediaTime {
        MediaTime::new(
            self.duration.value.saturating_mul(self.sample_count as i64),
            self.duration.timescale,
        )
    }
}

impl From<VideoSample> for SampleUnit {
    fn from(sample: VideoSample) -> Self {
        Self {
            format: SampleFormat::Video {
                is_keyframe: sample.is_keyframe,
                codec_config: sample.codec_config,
            },
            pts: sample.pts,
            duration: MediaTime::new(0, sample.pts.timescale.max(1)),
            dts: None,
            sample_count: 1,
            data: sample.data,
        }
    }
}
