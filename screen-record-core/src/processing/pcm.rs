//! Linear PCM helpers: layout conversion, sample decoding, downmixing,
//! resampling and 16-bit encoding.
//!
//! Integer samples are always signed. All `f32` data is in `[-1.0, 1.0]`.

use crate::models::media::AudioFormat;

/// Interleave per-channel byte planes into one frame-ordered buffer.
///
/// Returns `None` if the planes differ in length or are not whole samples.
pub fn interleave_planes(planes: &[Vec<u8>], bytes_per_sample: usize) -> Option<Vec<u8>> {
    let first = planes.first()?;
    if bytes_per_sample == 0 || first.len() % bytes_per_sample != 0 {
        return None;
    }
    if planes.iter().any(|p| p.len() != first.len()) {
        return None;
    }

    let frames = first.len() / bytes_per_sample;
    let mut out = Vec::with_capacity(first.len() * planes.len());
    for frame in 0..frames {
        let start = frame * bytes_per_sample;
        for plane in planes {
            out.extend_from_slice(&plane[start..start + bytes_per_sample]);
        }
    }
    Some(out)
}

/// Decode interleaved PCM bytes into interleaved `f32` samples.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode_to_f32(format: &AudioFormat, data: &[u8]) -> Vec<f32> {
    let width = format.bytes_per_sample();
    if width == 0 {
        return Vec::new();
    }

    data.chunks_exact(width)
        .map(|raw| decode_sample(format, raw))
        .collect()
}

fn decode_sample(format: &AudioFormat, raw: &[u8]) -> f32 {
    let big = format.is_big_endian;
    match (format.is_float, raw.len()) {
        (true, 4) => {
            let bytes = [raw[0], raw[1], raw[2], raw[3]];
            if big {
                f32::from_be_bytes(bytes)
            } else {
                f32::from_le_bytes(bytes)
            }
        }
        (true, 8) => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(raw);
            let v = if big {
                f64::from_be_bytes(bytes)
            } else {
                f64::from_le_bytes(bytes)
            };
            v as f32
        }
        (false, 1) => raw[0] as i8 as f32 / 128.0,
        (false, 2) => {
            let bytes = [raw[0], raw[1]];
            let v = if big {
                i16::from_be_bytes(bytes)
            } else {
                i16::from_le_bytes(bytes)
            };
            v as f32 / 32768.0
        }
        (false, 3) => {
            // Sign-extend through the top byte of an i32.
            let bytes = if big {
                [raw[0], raw[1], raw[2], 0]
            } else {
                [raw[2], raw[1], raw[0], 0]
            };
            let v = i32::from_be_bytes(bytes) >> 8;
            v as f32 / 8_388_608.0
        }
        (false, 4) => {
            let bytes = [raw[0], raw[1], raw[2], raw[3]];
            let v = if big {
                i32::from_be_bytes(bytes)
            } else {
                i32::from_le_bytes(bytes)
            };
            (v as f64 / 2_147_483_648.0) as f32
        }
        _ => 0.0,
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Duplicate a mono signal into `channels` interleaved channels.
pub fn upmix_mono(mono: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return mono.to_vec();
    }
    mono.iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels))
        .collect()
}

/// Streaming linear-interpolation resampler for mono audio.
///
/// Carries the read position and the last input sample across calls, so a
/// stream cut into buffers resamples to the same length as the whole stream.
#[derive(Debug, Clone, Default)]
pub struct Resampler {
    rates: Option<(f64, f64)>,
    /// Source index of the next output sample, relative to the next buffer's first sample.
    position: f64,
    last: Option<f32>,
}

impl Resampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the carried position and sample.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Resample one buffer. Returns input unchanged if rates match.
    pub fn process(&mut self, samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
        if (source_rate - target_rate).abs() < 0.01 || source_rate <= 0.0 || target_rate <= 0.0 {
            return samples.to_vec();
        }
        if self.rates != Some((source_rate, target_rate)) {
            self.reset();
            self.rates = Some((source_rate, target_rate));
        }
        if samples.is_empty() {
            return Vec::new();
        }

        let step = source_rate / target_rate;
        let len = samples.len() as f64;
        let mut output = Vec::with_capacity((len / step) as usize + 1);

        // Position -1 is the previous buffer's last sample.
        while self.position < len - 1.0 {
            let floor = self.position.floor();
            let fraction = (self.position - floor) as f32;
            let index = floor as isize;
            let (a, b) = if index < 0 {
                (self.last.unwrap_or(samples[0]), samples[0])
            } else {
                let i = index as usize;
                (samples[i], samples[(i + 1).min(samples.len() - 1)])
            };
            output.push(a * (1.0 - fraction) + b * fraction);
            self.position += step;
        }

        self.position -= len;
        self.last = samples.last().copied();
        output
    }
}

/// Convert `f32` samples to 16-bit little-endian PCM, clamping out-of-range values.
pub fn encode_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Bring interleaved PCM in `source` layout to 16-bit little-endian PCM in `target` layout.
///
/// Channels are folded through mono when the counts differ. `resampler`
/// carries rate conversion state between buffers of one stream. Returns the
/// encoded bytes and the number of output frames.
pub fn convert_to_track_format(
    source: &AudioFormat,
    data: &[u8],
    target: &AudioFormat,
    resampler: &mut Resampler,
) -> (Vec<u8>, usize) {
    let source_channels = source.channels.max(1) as usize;
    let target_channels = target.channels.max(1) as usize;

    let same_layout = !source.is_float
        && !source.is_big_endian
        && source.bits_per_channel == 16
        && source_channels == target_channels
        && (source.sample_rate - target.sample_rate).abs() < 0.01;
    if same_layout {
        let usable = data.len() - data.len() % (2 * source_channels);
        return (data[..usable].to_vec(), usable / (2 * source_channels));
    }

    let decoded = decode_to_f32(source, data);
    let samples = if source_channels == target_channels && target_channels == 1 {
        resampler.process(&decoded, source.sample_rate, target.sample_rate)
    } else {
        let mono = downmix_to_mono(&decoded, source_channels);
        let mono = resampler.process(&mono, source.sample_rate, target.sample_rate);
        upmix_mono(&mono, target_channels)
    };

    let frames = samples.len() / target_channels;
    (encode_i16_le(&samples), frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn interleave_two_planes() {
        let left = vec![1, 0, 2, 0];
        let right = vec![9, 0, 8, 0];
        let out = interleave_planes(&[left, right], 2).unwrap();
        assert_eq!(out, vec![1, 0, 9, 0, 2, 0, 8, 0]);
    }

    #[test]
    fn interleave_rejects_ragged_planes() {
        assert!(interleave_planes(&[vec![0, 0], vec![0, 0, 0, 0]], 2).is_none());
        assert!(interleave_planes(&[vec![0, 0, 0]], 2).is_none());
        assert!(interleave_planes(&[], 2).is_none());
    }

    #[test]
    fn decode_i16_both_endians() {
        let le = AudioFormat::pcm_i16(16_000.0, 1);
        let be = AudioFormat {
            is_big_endian: true,
            ..le
        };
        let value: i16 = -16384;
        assert_abs_diff_eq!(decode_to_f32(&le, &value.to_le_bytes())[0], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(decode_to_f32(&be, &value.to_be_bytes())[0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn decode_i24_sign_extends() {
        let format = AudioFormat {
            bits_per_channel: 24,
            ..AudioFormat::pcm_i16(48_000.0, 1)
        };
        // -4194304 = 0xC00000 → -0.5
        let out = decode_to_f32(&format, &[0x00, 0x00, 0xC0]);
        assert_abs_diff_eq!(out[0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn decode_f32() {
        let format = AudioFormat::pcm_f32(48_000.0, 1, true);
        let bytes: Vec<u8> = [0.25f32, -0.75].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(decode_to_f32(&format, &bytes), vec![0.25, -0.75]);
    }

    #[test]
    fn downmix_stereo_to_mono() {
        let mono = downmix_to_mono(&[0.2, 0.8, 0.4, 0.6], 2);
        assert_eq!(mono.len(), 2);
        assert_abs_diff_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn resample_48k_to_16k_thirds_length() {
        let input = vec![0.5f32; 480];
        let out = Resampler::new().process(&input, 48_000.0, 16_000.0);
        assert_eq!(out.len(), 160);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn resampler_keeps_length_across_buffers() {
        let mut resampler = Resampler::new();
        let mut produced = 0usize;
        let buffers = 2812;
        for _ in 0..buffers {
            produced += resampler.process(&[0.1f32; 1024], 48_000.0, 16_000.0).len();
        }
        let expected = (buffers * 1024) as f64 / 3.0;
        assert!((produced as f64 - expected).abs() <= 1.0, "{} vs {}", produced, expected);
    }

    #[test]
    fn resampler_interpolates_across_buffer_boundary() {
        let mut resampler = Resampler::new();
        // 44.1 kHz -> 16 kHz puts output samples between buffers.
        let ramp: Vec<f32> = (0..441).map(|i| i as f32 / 441.0).collect();
        let whole = Resampler::new().process(&ramp, 44_100.0, 16_000.0);
        let mut split = resampler.process(&ramp[..200], 44_100.0, 16_000.0);
        split.extend(resampler.process(&ramp[200..], 44_100.0, 16_000.0));
        assert_eq!(split.len(), whole.len());
        for (a, b) in split.iter().zip(&whole) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn encode_clamps() {
        let bytes = encode_i16_le(&[2.0, -2.0, 0.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn track_format_passthrough_for_matching_layout() {
        let format = AudioFormat::track_default();
        let data = vec![1u8, 2, 3, 4, 5];
        let (out, frames) = convert_to_track_format(&format, &data, &format, &mut Resampler::new());
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert_eq!(frames, 2);
    }

    #[test]
    fn track_format_from_stereo_float_48k() {
        let source = AudioFormat::pcm_f32(48_000.0, 2, true);
        let samples = vec![0.5f32; 48 * 2 * 3];
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let (out, frames) = convert_to_track_format(&source, &data, &AudioFormat::track_default(), &mut Resampler::new());
        assert_eq!(frames, 48);
        assert_eq!(out.len(), 96);
        let first = i16::from_le_bytes([out[0], out[1]]);
        assert_eq!(first, (0.5 * i16::MAX as f32) as i16);
    }
}
