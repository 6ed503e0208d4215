use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;
use crate::models::media::{
    AudioFormat, MediaTime, SampleFormat, SampleUnit, TrackKind, TrackSettings, VideoSettings,
};
use crate::models::state::SinkStatus;
use crate::processing::pcm::{self, Resampler};
use crate::storage::mp4_boxes::{self, MediaTables, TrackTables, VIDEO_TIMESCALE};
use crate::traits::media_sink::{MediaSink, SinkFactory};

/// Duration given to the last video sample: one frame at 30 fps.
const DEFAULT_FRAME_DURATION: u32 = VIDEO_TIMESCALE / 30;

/// Audio timestamp jitter absorbed without inserting silence or trimming: 20 ms.
const AUDIO_JITTER_DIVISOR: u32 = 50;

/// MP4 (ISO-BMFF) multiplexing sink.
///
/// ## File Layout
///
/// ```text
/// [ftyp]
/// [mdat, 64-bit size patched on finish]
///   interleaved video access units and 16-bit PCM chunks, in append order
/// [moov, written on finish]
/// ```
///
/// Audio units are brought to their track's fixed format on append, so any
/// supported PCM layout may be appended to an audio track. Each audio unit is
/// placed at its own timestamp: gaps are filled with silence and overlapping
/// frames are trimmed.
pub struct Mp4Sink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    status: SinkStatus,
    tracks: Vec<Mp4Track>,
    mdat_start: u64,
    write_offset: u64,
}

struct Mp4Track {
    kind: TrackKind,
    track_id: u32,
    finished: bool,
    media: TrackMedia,
}

enum TrackMedia {
    Video {
        settings: VideoSettings,
        codec_config: Option<Vec<u8>>,
        samples: Vec<VideoEntry>,
    },
    Audio {
        format: AudioFormat,
        /// First chunk's start relative to the origin, in track timescale.
        start: Option<i64>,
        /// End of the last written frame, in track timescale.
        end: i64,
        resampler: Resampler,
        chunks: Vec<AudioChunk>,
    },
}

struct VideoEntry {
    offset: u64,
    size: u32,
    /// Relative to the origin, in `VIDEO_TIMESCALE`.
    pts: i64,
    is_sync: bool,
}

struct AudioChunk {
    offset: u64,
    frames: u32,
}

impl Mp4Sink {
    /// Create the file and write the `ftyp` and `mdat` headers.
    pub fn create(path: &Path) -> Result<Self, RecordError> {
        let file = File::create(path)
            .map_err(|e| RecordError::SinkCreationFailed(format!("{}: {}", path.display(), e)))?;
        let mut file = BufWriter::new(file);

        let ftyp = mp4_boxes::ftyp();
        file.write_all(&ftyp)
            .and_then(|_| file.write_all(&mp4_boxes::mdat_header(0)))
            .map_err(|e| RecordError::SinkCreationFailed(format!("failed to write header: {}", e)))?;

        let mdat_start = ftyp.len() as u64;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            status: SinkStatus::Unknown,
            tracks: Vec::new(),
            mdat_start,
            write_offset: mdat_start + 16,
        })
    }

    fn track_index(&self, kind: TrackKind) -> Option<usize> {
        self.tracks.iter().position(|t| t.kind == kind)
    }

    fn fail(&mut self, error: RecordError) -> RecordError {
        log::error!("MP4 sink failed: {}", error);
        self.status = SinkStatus::Failed(error.clone());
        error
    }

    fn track_tables(&self) -> Vec<TrackTables> {
        self.tracks.iter().map(Mp4Track::tables).collect()
    }

    fn finalize_file(&mut self) -> io::Result<()> {
        let moov = mp4_boxes::moov(&self.track_tables());
        let mdat_size = self.write_offset - self.mdat_start;

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("file already closed"))?;
        file.seek(SeekFrom::Start(self.mdat_start))?;
        file.write_all(&mp4_boxes::mdat_header(mdat_size))?;
        file.seek(SeekFrom::Start(self.write_offset))?;
        file.write_all(&moov)?;
        file.flush()?;
        file.get_ref().sync_all()?;

        self.file = None;
        Ok(())
    }
}

/// Write `frames` audio frames as one chunk.
fn write_audio_chunk(
    file: &mut Option<BufWriter<File>>,
    write_offset: &mut u64,
    chunks: &mut Vec<AudioChunk>,
    data: &[u8],
    frames: u32,
) -> io::Result<()> {
    let offset = write_payload(file, write_offset, data)?;
    chunks.push(AudioChunk { offset, frames });
    Ok(())
}

/// Append raw bytes at the end of `mdat`, returning their file offset.
fn write_payload(file: &mut Option<BufWriter<File>>, write_offset: &mut u64, data: &[u8]) -> io::Result<u64> {
    let file = file.as_mut().ok_or_else(|| io::Error::other("file already closed"))?;
    file.write_all(data)?;
    let offset = *write_offset;
    *write_offset += data.len() as u64;
    Ok(offset)
}

impl MediaSink for Mp4Sink {
    fn add_track(&mut self, kind: TrackKind, settings: TrackSettings) -> Result<(), RecordError> {
        if self.status != SinkStatus::Unknown {
            return Err(RecordError::InvalidState("tracks must be added before writing starts".into()));
        }
        if self.track_index(kind).is_some() {
            return Err(RecordError::ConfigurationFailed(format!("{} track already added", kind)));
        }

        let media = match (kind, settings) {
            (TrackKind::Video, TrackSettings::Video(settings)) => TrackMedia::Video {
                settings,
                codec_config: None,
                samples: Vec::new(),
            },
            (TrackKind::Microphone | TrackKind::Application, TrackSettings::Audio(format)) => {
                if format.is_float || format.bits_per_channel != 16 || format.channels == 0 {
                    return Err(RecordError::ConfigurationFailed(
                        "audio tracks store 16-bit integer PCM".into(),
                    ));
                }
                TrackMedia::Audio {
                    format: AudioFormat {
                        is_big_endian: false,
                        is_interleaved: true,
                        ..format
                    },
                    start: None,
                    end: 0,
                    resampler: Resampler::new(),
                    chunks: Vec::new(),
                }
            }
            _ => {
                return Err(RecordError::ConfigurationFailed(format!(
                    "settings do not match {} track",
                    kind
                )))
            }
        };

        self.tracks.push(Mp4Track {
            kind,
            track_id: self.tracks.len() as u32 + 1,
            finished: false,
            media,
        });
        log::debug!("Added {} track to {}", kind, self.path.display());
        Ok(())
    }

    fn status(&self) -> SinkStatus {
        self.status.clone()
    }

    fn start_writing(&mut self, origin: MediaTime) -> Result<(), RecordError> {
        if self.status != SinkStatus::Unknown {
            return Err(RecordError::InvalidState(format!(
                "cannot start writing from {:?}",
                self.status
            )));
        }
        log::info!("Writing {} from origin {}", self.path.display(), origin);
        self.status = SinkStatus::Writing { origin };
        Ok(())
    }

    fn is_ready_for_more_data(&self, kind: TrackKind) -> bool {
        self.status.is_writing()
            && self
                .track_index(kind)
                .map(|i| !self.tracks[i].finished)
                .unwrap_or(false)
    }

    fn append(&mut self, kind: TrackKind, unit: SampleUnit) -> Result<(), RecordError> {
        let origin = self
            .status
            .origin()
            .ok_or_else(|| RecordError::InvalidState("sink is not writing".into()))?;
        let index = self
            .track_index(kind)
            .ok_or_else(|| RecordError::AppendFailed(format!("no {} track", kind)))?;
        if self.tracks[index].finished {
            return Err(RecordError::AppendFailed(format!("{} track is finished", kind)));
        }

        let relative = unit.pts.saturating_sub(&origin);
        if relative.value < 0 {
            return Err(RecordError::AppendFailed("sample precedes session start".into()));
        }

        let track = &mut self.tracks[index];
        let size = unit.data.len() as u32;
        let written = match (&mut track.media, unit.format) {
            (
                TrackMedia::Video {
                    codec_config, samples, ..
                },
                SampleFormat::Video {
                    is_keyframe,
                    codec_config: config,
                },
            ) => {
                if codec_config.is_none() {
                    *codec_config = config;
                }
                write_payload(&mut self.file, &mut self.write_offset, &unit.data).map(|offset| {
                    samples.push(VideoEntry {
                        offset,
                        size,
                        pts: relative.rescale(VIDEO_TIMESCALE),
                        is_sync: is_keyframe,
                    })
                })
            }
            (
                TrackMedia::Audio {
                    format,
                    start,
                    end,
                    resampler,
                    chunks,
                },
                SampleFormat::Audio(description),
            ) => {
                let (bytes, frames) =
                    pcm::convert_to_track_format(&description.format, &unit.data, format, resampler);
                if frames == 0 {
                    return Ok(());
                }
                let rate = format.sample_rate.round() as u32;
                let bytes_per_frame = format.bytes_per_frame();
                let at = relative.rescale(rate);
                let jitter = (rate / AUDIO_JITTER_DIVISOR).max(1) as i64;

                let mut silence = 0i64;
                let mut skip = 0usize;
                match *start {
                    None => {
                        *start = Some(at);
                        *end = at;
                    }
                    Some(_) => {
                        let offset = at - *end;
                        if offset > jitter {
                            silence = offset;
                        } else if offset < -jitter {
                            skip = (-offset).min(frames as i64) as usize;
                        }
                    }
                }
                if skip == frames {
                    log::debug!("Dropped {} audio chunk fully overlapping written audio", kind);
                    return Ok(());
                }
                if silence > 0 {
                    log::debug!("Filling {} frame gap in {} track", silence, kind);
                } else if skip > 0 {
                    log::debug!("Trimmed {} overlapping frames from {} track", skip, kind);
                }

                let mut written = Ok(());
                let mut remaining = silence;
                while remaining > 0 && written.is_ok() {
                    let count = remaining.min(rate as i64);
                    let zeros = vec![0u8; count as usize * bytes_per_frame];
                    written = write_audio_chunk(
                        &mut self.file,
                        &mut self.write_offset,
                        chunks,
                        &zeros,
                        count as u32,
                    );
                    remaining -= count;
                }
                let kept = frames - skip;
                written
                    .and_then(|_| {
                        write_audio_chunk(
                            &mut self.file,
                            &mut self.write_offset,
                            chunks,
                            &bytes[skip * bytes_per_frame..],
                            kept as u32,
                        )
                    })
                    .map(|_| *end += silence + kept as i64)
            }
            _ => {
                return Err(RecordError::AppendFailed(format!(
                    "sample format does not match {} track",
                    kind
                )))
            }
        };

        written.map_err(|e| self.fail(RecordError::StorageError(e.to_string())))
    }

    fn mark_finished(&mut self, kind: TrackKind) {
        if let Some(index) = self.track_index(kind) {
            self.tracks[index].finished = true;
        }
    }

    fn finish(&mut self) -> Result<PathBuf, RecordError> {
        match &self.status {
            SinkStatus::Failed(e) => return Err(RecordError::FinalizeFailed(e.to_string())),
            SinkStatus::Completed => return Err(RecordError::InvalidState("sink already finished".into())),
            SinkStatus::Unknown => log::warn!("Finishing {} without any written samples", self.path.display()),
            SinkStatus::Writing { .. } => {}
        }

        for track in self.tracks.iter_mut().filter(|t| !t.finished) {
            log::debug!("Finishing unmarked {} track", track.kind);
            track.finished = true;
        }

        if let Err(e) = self.finalize_file() {
            let error = RecordError::FinalizeFailed(e.to_string());
            return Err(self.fail(error));
        }

        self.status = SinkStatus::Completed;
        log::info!("Finalized {}", self.path.display());
        Ok(self.path.clone())
    }

    fn output_path(&self) -> &Path {
        &self.path
    }
}

impl Mp4Track {
    fn tables(&self) -> TrackTables {
        match &self.media {
            TrackMedia::Video {
                settings,
                codec_config,
                samples,
            } => {
                let mut deltas: Vec<u32> = samples
                    .windows(2)
                    .map(|pair| (pair[1].pts - pair[0].pts).clamp(0, u32::MAX as i64) as u32)
                    .collect();
                if !samples.is_empty() {
                    deltas.push(deltas.last().copied().unwrap_or(DEFAULT_FRAME_DURATION));
                }

                TrackTables {
                    track_id: self.track_id,
                    timescale: VIDEO_TIMESCALE,
                    media_duration: deltas.iter().map(|&d| d as u64).sum(),
                    start_offset: samples.first().map(|s| s.pts.max(0) as u64).unwrap_or(0),
                    chunk_offsets: samples.iter().map(|s| s.offset).collect(),
                    media: MediaTables::Video {
                        codec: settings.codec,
                        size: settings.size,
                        codec_config: codec_config.clone(),
                        sample_sizes: samples.iter().map(|s| s.size).collect(),
                        sample_deltas: deltas,
                        sync_samples: samples
                            .iter()
                            .enumerate()
                            .filter(|(_, s)| s.is_sync)
                            .map(|(i, _)| i as u32 + 1)
                            .collect(),
                    },
                }
            }
            TrackMedia::Audio {
                format, start, chunks, ..
            } => TrackTables {
                track_id: self.track_id,
                timescale: format.sample_rate.round() as u32,
                media_duration: chunks.iter().map(|c| c.frames as u64).sum(),
                start_offset: start.unwrap_or(0).max(0) as u64,
                chunk_offsets: chunks.iter().map(|c| c.offset).collect(),
                media: MediaTables::Audio {
                    format: *format,
                    chunk_frames: chunks.iter().map(|c| c.frames).collect(),
                },
            },
        }
    }
}

/// Creates an [`Mp4Sink`] per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4SinkFactory;

impl SinkFactory for Mp4SinkFactory {
    fn create(&self, destination: &Path) -> Result<Box<dyn MediaSink>, RecordError> {
        Ok(Box::new(Mp4Sink::create(destination)?))
    }
}
