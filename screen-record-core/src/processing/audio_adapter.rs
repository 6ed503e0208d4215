use std::sync::Arc;

use crate::models::config::TimestampPolicy;
use crate::models::error::ConversionError;
use crate::models::media::{
    AudioFormat, AudioFormatDescription, MediaTime, PcmBuffer, PcmData, SampleFormat, SampleUnit,
};
use crate::processing::pcm;
use crate::traits::host_clock::{HostClock, MonotonicClock};

const MAX_CHANNELS: u16 = 8;

/// Converts raw caller-supplied PCM buffers into timed sample units.
///
/// Holds no state besides its clock, so one adapter can serve any number of
/// streams concurrently.
#[derive(Clone)]
pub struct AudioSampleAdapter {
    clock: Arc<dyn HostClock>,
    policy: TimestampPolicy,
}

impl AudioSampleAdapter {
    pub fn new(clock: Arc<dyn HostClock>, policy: TimestampPolicy) -> Self {
        Self { clock, policy }
    }

    /// Convert one buffer.
    ///
    /// 1. derive a format description from the buffer's format,
    /// 2. stamp it: duration `1 / sample_rate`, presentation time from the
    ///    buffer's host time (or the clock), no decode time,
    /// 3. allocate a unit with `frame_length` samples,
    /// 4. fill it with the buffer's data, interleaved.
    pub fn convert(&self, buffer: &PcmBuffer) -> Result<SampleUnit, ConversionError> {
        let description = describe(&buffer.format)?;

        let timescale = description.format.sample_rate.round() as u32;
        let duration = MediaTime::new(1, timescale);
        let pts = match (self.policy, buffer.host_time) {
            (TimestampPolicy::HostTimeOrClock, Some(host_time)) => host_time,
            _ => self.clock.now(),
        };

        let mut unit = allocate(description, buffer.frame_length, pts, duration)?;
        populate(&mut unit, buffer)?;
        Ok(unit)
    }
}

impl Default for AudioSampleAdapter {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock), TimestampPolicy::default())
    }
}

/// Build a format description, rejecting layouts the sink cannot decode.
pub fn describe(format: &AudioFormat) -> Result<AudioFormatDescription, ConversionError> {
    if !format.sample_rate.is_finite() || format.sample_rate < 1.0 || format.sample_rate > u32::MAX as f64 {
        return Err(ConversionError::FormatDescription(format!(
            "invalid sample rate {}",
            format.sample_rate
        )));
    }
    if format.channels == 0 || format.channels > MAX_CHANNELS {
        return Err(ConversionError::FormatDescription(format!(
            "unsupported channel count {}",
            format.channels
        )));
    }
    let bits_ok = if format.is_float {
        matches!(format.bits_per_channel, 32 | 64)
    } else {
        matches!(format.bits_per_channel, 8 | 16 | 24 | 32)
    };
    if !bits_ok {
        return Err(ConversionError::FormatDescription(format!(
            "unsupported {} bit depth {}",
            if format.is_float { "float" } else { "integer" },
            format.bits_per_channel
        )));
    }

    let bytes_per_frame = format.bytes_per_frame() as u32;
    Ok(AudioFormatDescription {
        format: AudioFormat {
            is_interleaved: true,
            ..*format
        },
        bytes_per_frame,
        frames_per_packet: 1,
        bytes_per_packet: bytes_per_frame,
    })
}

fn allocate(
    description: AudioFormatDescription,
    frame_length: u32,
    pts: MediaTime,
    duration: MediaTime,
) -> Result<SampleUnit, ConversionError> {
    if frame_length == 0 {
        return Err(ConversionError::Allocation("buffer holds no frames".into()));
    }
    let capacity = (frame_length as usize)
        .checked_mul(description.bytes_per_frame as usize)
        .ok_or_else(|| ConversionError::Allocation("payload size overflows".into()))?;

    Ok(SampleUnit {
        format: SampleFormat::Audio(description),
        pts,
        duration,
        dts: None,
        sample_count: frame_length,
        data: Vec::with_capacity(capacity),
    })
}

fn populate(unit: &mut SampleUnit, buffer: &PcmBuffer) -> Result<(), ConversionError> {
    let format = &buffer.format;
    let expected = buffer.frame_length as usize * format.bytes_per_frame();

    let interleaved = match &buffer.data {
        PcmData::Interleaved(bytes) => {
            if bytes.len() < expected {
                return Err(ConversionError::Population(format!(
                    "expected {} bytes, buffer has {}",
                    expected,
                    bytes.len()
                )));
            }
            bytes[..expected].to_vec()
        }
        PcmData::Planar(planes) => {
            if planes.len() != format.channels as usize {
                return Err(ConversionError::Population(format!(
                    "expected {} planes, buffer has {}",
                    format.channels,
                    planes.len()
                )));
            }
            let plane_len = buffer.frame_length as usize * format.bytes_per_sample();
            let trimmed: Vec<Vec<u8>> = planes
                .iter()
                .map(|p| p.get(..plane_len).map(<[u8]>::to_vec))
                .collect::<Option<_>>()
                .ok_or_else(|| ConversionError::Population("plane shorter than frame length".into()))?;
            pcm::interleave_planes(&trimmed, format.bytes_per_sample())
                .ok_or_else(|| ConversionError::Population("planes could not be interleaved".into()))?
        }
    };

    unit.data.extend_from_slice(&interleaved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedClock;

    fn adapter_at(secs: f64, policy: TimestampPolicy) -> AudioSampleAdapter {
        AudioSampleAdapter::new(Arc::new(FixedClock::at_secs(secs)), policy)
    }

    #[test]
    fn frame_count_and_duration_follow_buffer() {
        let adapter = adapter_at(1.0, TimestampPolicy::HostTimeOrClock);
        for (rate, frames) in [(16_000.0, 160usize), (44_100.0, 441), (48_000.0, 1024)] {
            let buffer = PcmBuffer::from_i16(rate, 1, &vec![0i16; frames]);
            let unit = adapter.convert(&buffer).unwrap();
            assert_eq!(unit.sample_count, frames as u32);
            assert_eq!(unit.duration, MediaTime::new(1, rate as u32));
            assert!(unit.dts.is_none());
            assert_eq!(unit.data.len(), frames * 2);
        }
    }

    #[test]
    fn clock_used_when_buffer_has_no_host_time() {
        let adapter = adapter_at(2.5, TimestampPolicy::HostTimeOrClock);
        let unit = adapter.convert(&PcmBuffer::from_i16(16_000.0, 1, &[1, 2])).unwrap();
        assert_eq!(unit.pts, MediaTime::from_secs_f64(2.5, 1_000_000_000));
    }

    #[test]
    fn host_time_preferred_over_clock() {
        let adapter = adapter_at(9.0, TimestampPolicy::HostTimeOrClock);
        let host = MediaTime::new(3, 1);
        let buffer = PcmBuffer::from_i16(16_000.0, 1, &[1, 2]).with_host_time(host);
        assert_eq!(adapter.convert(&buffer).unwrap().pts, host);
    }

    #[test]
    fn clock_policy_ignores_host_time() {
        let adapter = adapter_at(9.0, TimestampPolicy::Clock);
        let buffer = PcmBuffer::from_i16(16_000.0, 1, &[1, 2]).with_host_time(MediaTime::new(3, 1));
        assert_eq!(adapter.convert(&buffer).unwrap().pts, MediaTime::new(9, 1));
    }

    #[test]
    fn malformed_descriptor_is_rejected() {
        let adapter = AudioSampleAdapter::default();
        let mut bad_rate = PcmBuffer::from_i16(16_000.0, 1, &[0; 4]);
        bad_rate.format.sample_rate = 0.0;
        let mut bad_bits = PcmBuffer::from_i16(16_000.0, 1, &[0; 4]);
        bad_bits.format.bits_per_channel = 12;
        let mut bad_channels = PcmBuffer::from_i16(16_000.0, 1, &[0; 4]);
        bad_channels.format.channels = 0;
        let mut float16 = PcmBuffer::from_i16(16_000.0, 1, &[0; 4]);
        float16.format.is_float = true;

        for buffer in [bad_rate, bad_bits, bad_channels, float16] {
            assert!(matches!(
                adapter.convert(&buffer),
                Err(ConversionError::FormatDescription(_))
            ));
        }
    }

    #[test]
    fn empty_buffer_fails_allocation() {
        let adapter = AudioSampleAdapter::default();
        let buffer = PcmBuffer::from_i16(16_000.0, 1, &[]);
        assert!(matches!(adapter.convert(&buffer), Err(ConversionError::Allocation(_))));
    }

    #[test]
    fn short_payload_fails_population() {
        let adapter = AudioSampleAdapter::default();
        let mut buffer = PcmBuffer::from_i16(16_000.0, 1, &[0; 4]);
        buffer.frame_length = 10;
        assert!(matches!(adapter.convert(&buffer), Err(ConversionError::Population(_))));
    }

    #[test]
    fn planar_buffer_is_interleaved() {
        let adapter = AudioSampleAdapter::default();
        let left: Vec<u8> = [0.25f32, 0.5].iter().flat_map(|s| s.to_le_bytes()).collect();
        let right: Vec<u8> = [-0.25f32, -0.5].iter().flat_map(|s| s.to_le_bytes()).collect();
        let buffer = PcmBuffer::new(
            AudioFormat::pcm_f32(48_000.0, 2, false),
            2,
            PcmData::Planar(vec![left, right]),
        );

        let unit = adapter.convert(&buffer).unwrap();
        let desc = unit.audio_description().unwrap();
        assert!(desc.format.is_interleaved);
        assert_eq!(desc.bytes_per_frame, 8);
        assert_eq!(pcm::decode_to_f32(&desc.format, &unit.data), vec![0.25, -0.25, 0.5, -0.5]);
    }

    #[test]
    fn planar_buffer_with_missing_plane_fails_population() {
        let adapter = AudioSampleAdapter::default();
        let buffer = PcmBuffer::new(
            AudioFormat::pcm_f32(48_000.0, 2, false),
            1,
            PcmData::Planar(vec![vec![0; 4]]),
        );
        assert!(matches!(adapter.convert(&buffer), Err(ConversionError::Population(_))));
    }
}
