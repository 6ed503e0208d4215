//! ISO-BMFF box serialization for the MP4 sink.
//!
//! Boxes are built in memory: `begin` writes a placeholder size, `end`
//! patches it once the payload is known.

use crate::models::media::{AudioFormat, FrameSize, VideoCodec};

pub const MOVIE_TIMESCALE: u32 = 1000;
pub const VIDEO_TIMESCALE: u32 = 90_000;

const UNITY_MATRIX: [u32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];
const LANGUAGE_UND: u16 = 0x55C4;

/// Growable big-endian byte sink with nested box bookkeeping.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: Vec<u8>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Open a box and return its start offset for [`BoxWriter::end`].
    pub fn begin(&mut self, fourcc: &[u8; 4]) -> usize {
        let start = self.buf.len();
        self.u32(0);
        self.bytes(fourcc);
        start
    }

    /// Open a full box (version + 24-bit flags).
    pub fn begin_full(&mut self, fourcc: &[u8; 4], version: u8, flags: u32) -> usize {
        let start = self.begin(fourcc);
        self.u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
        start
    }

    pub fn end(&mut self, start: usize) {
        let size = (self.buf.len() - start) as u32;
        self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }
}

/// `ftyp` written at the head of every file.
pub fn ftyp() -> Vec<u8> {
    let mut w = BoxWriter::new();
    let b = w.begin(b"ftyp");
    w.bytes(b"isom");
    w.u32(0x200);
    for brand in [b"isom", b"iso2", b"avc1", b"mp41"] {
        w.bytes(brand);
    }
    w.end(b);
    w.into_inner()
}

/// 16-byte `mdat` header using the 64-bit size field.
pub fn mdat_header(total_size: u64) -> [u8; 16] {
    let mut header = [0u8; 16];
    header[0..4].copy_from_slice(&1u32.to_be_bytes());
    header[4..8].copy_from_slice(b"mdat");
    header[8..16].copy_from_slice(&total_size.to_be_bytes());
    header
}

/// Everything `moov` needs to know about one track.
#[derive(Debug, Clone)]
pub struct TrackTables {
    pub track_id: u32,
    pub timescale: u32,
    pub media: MediaTables,
    /// Media duration in `timescale` units.
    pub media_duration: u64,
    /// Empty edit before the first sample, in `timescale` units.
    pub start_offset: u64,
    /// File offset of every chunk.
    pub chunk_offsets: Vec<u64>,
}

#[derive(Debug, Clone)]
pub enum MediaTables {
    Video {
        codec: VideoCodec,
        size: FrameSize,
        codec_config: Option<Vec<u8>>,
        sample_sizes: Vec<u32>,
        sample_deltas: Vec<u32>,
        /// 1-based sample numbers of sync samples.
        sync_samples: Vec<u32>,
    },
    Audio {
        format: AudioFormat,
        /// Frames in each chunk, parallel to `chunk_offsets`.
        chunk_frames: Vec<u32>,
    },
}

impl TrackTables {
    pub fn movie_duration(&self) -> u64 {
        to_movie_time(self.start_offset + self.media_duration, self.timescale)
    }
}

fn to_movie_time(value: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    (value as u128 * MOVIE_TIMESCALE as u128 / timescale as u128) as u64
}

/// Build the complete `moov` box.
pub fn moov(tracks: &[TrackTables]) -> Vec<u8> {
    let mut w = BoxWriter::new();
    let moov = w.begin(b"moov");

    let duration = tracks.iter().map(TrackTables::movie_duration).max().unwrap_or(0);
    write_mvhd(&mut w, duration, tracks.len() as u32 + 1);
    for track in tracks {
        write_trak(&mut w, track);
    }

    w.end(moov);
    w.into_inner()
}

fn write_mvhd(w: &mut BoxWriter, duration: u64, next_track_id: u32) {
    let b = w.begin_full(b"mvhd", 0, 0);
    w.u32(0); // creation_time
    w.u32(0); // modification_time
    w.u32(MOVIE_TIMESCALE);
    w.u32(duration.min(u32::MAX as u64) as u32);
    w.u32(0x00010000); // rate 1.0
    w.u16(0x0100); // volume 1.0
    w.zeros(10);
    UNITY_MATRIX.iter().for_each(|&v| w.u32(v));
    w.zeros(24); // pre_defined
    w.u32(next_track_id);
    w.end(b);
}

fn write_trak(w: &mut BoxWriter, track: &TrackTables) {
    let trak = w.begin(b"trak");
    write_tkhd(w, track);
    write_edts(w, track);

    let mdia = w.begin(b"mdia");
    write_mdhd(w, track);
    let (handler, name): (&[u8; 4], &[u8]) = match track.media {
        MediaTables::Video { .. } => (b"vide", &b"VideoHandler\0"[..]),
        MediaTables::Audio { .. } => (b"soun", &b"SoundHandler\0"[..]),
    };
    write_hdlr(w, handler, name);

    let minf = w.begin(b"minf");
    match track.media {
        MediaTables::Video { .. } => {
            let b = w.begin_full(b"vmhd", 0, 1);
            w.u16(0); // graphicsmode
            w.zeros(6); // opcolor
            w.end(b);
        }
        MediaTables::Audio { .. } => {
            let b = w.begin_full(b"smhd", 0, 0);
            w.u16(0); // balance
            w.u16(0);
            w.end(b);
        }
    }
    write_dinf(w);
    write_stbl(w, track);
    w.end(minf);

    w.end(mdia);
    w.end(trak);
}

fn write_tkhd(w: &mut BoxWriter, track: &TrackTables) {
    // track_enabled | track_in_movie
    let b = w.begin_full(b"tkhd", 0, 0x03);
    w.u32(0);
    w.u32(0);
    w.u32(track.track_id);
    w.u32(0);
    w.u32(track.movie_duration().min(u32::MAX as u64) as u32);
    w.zeros(8);
    w.u16(0); // layer
    w.u16(0); // alternate_group
    match &track.media {
        MediaTables::Video { size, .. } => {
            w.u16(0);
            w.u16(0);
            UNITY_MATRIX.iter().for_each(|&v| w.u32(v));
            w.u32(size.width << 16);
            w.u32(size.height << 16);
        }
        MediaTables::Audio { .. } => {
            w.u16(0x0100);
            w.u16(0);
            UNITY_MATRIX.iter().for_each(|&v| w.u32(v));
            w.u32(0);
            w.u32(0);
        }
    }
    w.end(b);
}

fn write_edts(w: &mut BoxWriter, track: &TrackTables) {
    let edts = w.begin(b"edts");
    let empty = to_movie_time(track.start_offset, track.timescale);
    let entries = if empty > 0 { 2 } else { 1 };

    let b = w.begin_full(b"elst", 0, 0);
    w.u32(entries);
    if empty > 0 {
        w.u32(empty.min(u32::MAX as u64) as u32);
        w.i32(-1);
        w.i16(1);
        w.i16(0);
    }
    w.u32(to_movie_time(track.media_duration, track.timescale).min(u32::MAX as u64) as u32);
    w.i32(0);
    w.i16(1);
    w.i16(0);
    w.end(b);

    w.end(edts);
}

fn write_mdhd(w: &mut BoxWriter, track: &TrackTables) {
    let b = w.begin_full(b"mdhd", 0, 0);
    w.u32(0);
    w.u32(0);
    w.u32(track.timescale);
    w.u32(track.media_duration.min(u32::MAX as u64) as u32);
    w.u16(LANGUAGE_UND);
    w.u16(0);
    w.end(b);
}

fn write_hdlr(w: &mut BoxWriter, handler: &[u8; 4], name: &[u8]) {
    let b = w.begin_full(b"hdlr", 0, 0);
    w.u32(0);
    w.bytes(handler);
    w.zeros(12);
    w.bytes(name);
    w.end(b);
}

fn write_dinf(w: &mut BoxWriter) {
    let dinf = w.begin(b"dinf");
    let dref = w.begin_full(b"dref", 0, 0);
    w.u32(1);
    // self-contained
    let url = w.begin_full(b"url ", 0, 1);
    w.end(url);
    w.end(dref);
    w.end(dinf);
}

fn write_stbl(w: &mut BoxWriter, track: &TrackTables) {
    let stbl = w.begin(b"stbl");
    write_stsd(w, &track.media);

    match &track.media {
        MediaTables::Video {
            sample_sizes,
            sample_deltas,
            sync_samples,
            ..
        } => {
            write_stts(w, &run_lengths(sample_deltas));
            if sync_samples.len() != sample_sizes.len() {
                let b = w.begin_full(b"stss", 0, 0);
                w.u32(sync_samples.len() as u32);
                sync_samples.iter().for_each(|&n| w.u32(n));
                w.end(b);
            }
            // one sample per chunk
            let b = w.begin_full(b"stsc", 0, 0);
            if sample_sizes.is_empty() {
                w.u32(0);
            } else {
                w.u32(1);
                w.u32(1);
                w.u32(1);
                w.u32(1);
            }
            w.end(b);

            let b = w.begin_full(b"stsz", 0, 0);
            w.u32(0);
            w.u32(sample_sizes.len() as u32);
            sample_sizes.iter().for_each(|&s| w.u32(s));
            w.end(b);
        }
        MediaTables::Audio { format, chunk_frames } => {
            let total: u64 = chunk_frames.iter().map(|&f| f as u64).sum();
            let stts = if total > 0 { vec![(total.min(u32::MAX as u64) as u32, 1)] } else { Vec::new() };
            write_stts(w, &stts);

            let b = w.begin_full(b"stsc", 0, 0);
            let runs = chunk_runs(chunk_frames);
            w.u32(runs.len() as u32);
            for (first_chunk, frames) in runs {
                w.u32(first_chunk);
                w.u32(frames);
                w.u32(1);
            }
            w.end(b);

            let b = w.begin_full(b"stsz", 0, 0);
            w.u32(format.bytes_per_frame() as u32);
            w.u32(total.min(u32::MAX as u64) as u32);
            w.end(b);
        }
    }

    let b = w.begin_full(b"co64", 0, 0);
    w.u32(track.chunk_offsets.len() as u32);
    track.chunk_offsets.iter().for_each(|&o| w.u64(o));
    w.end(b);

    w.end(stbl);
}

fn write_stsd(w: &mut BoxWriter, media: &MediaTables) {
    let stsd = w.begin_full(b"stsd", 0, 0);
    w.u32(1);
    match media {
        MediaTables::Video {
            codec,
            size,
            codec_config,
            ..
        } => {
            let entry = w.begin(codec.fourcc());
            w.zeros(6);
            w.u16(1); // data_reference_index
            w.u16(0);
            w.u16(0);
            w.zeros(12);
            w.u16(size.width as u16);
            w.u16(size.height as u16);
            w.u32(0x00480000); // 72 dpi
            w.u32(0x00480000);
            w.u32(0);
            w.u16(1); // frame_count
            w.zeros(32); // compressorname
            w.u16(0x0018);
            w.i16(-1);
            if let Some(config) = codec_config {
                let avcc = w.begin(b"avcC");
                w.bytes(config);
                w.end(avcc);
            }
            w.end(entry);
        }
        MediaTables::Audio { format, .. } => {
            let entry = w.begin(b"ipcm");
            w.zeros(6);
            w.u16(1);
            w.zeros(8);
            w.u16(format.channels);
            w.u16(format.bits_per_channel);
            w.u16(0);
            w.u16(0);
            w.u32(((format.sample_rate.round() as u32) & 0xFFFF) << 16);
            let pcmc = w.begin_full(b"pcmC", 0, 0);
            // bit 0: little endian
            w.u8(if format.is_big_endian { 0 } else { 1 });
            w.u8(format.bits_per_channel as u8);
            w.end(pcmc);
            w.end(entry);
        }
    }
    w.end(stsd);
}

fn write_stts(w: &mut BoxWriter, entries: &[(u32, u32)]) {
    let b = w.begin_full(b"stts", 0, 0);
    w.u32(entries.len() as u32);
    for &(count, delta) in entries {
        w.u32(count);
        w.u32(delta);
    }
    w.end(b);
}

/// Collapse consecutive equal values into `(count, value)` pairs.
pub fn run_lengths(values: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &v in values {
        match runs.last_mut() {
            Some((count, last)) if *last == v => *count += 1,
            _ => runs.push((1, v)),
        }
    }
    runs
}

/// `stsc` runs: `(first_chunk, frames_per_chunk)`, 1-based, one entry per change.
pub fn chunk_runs(chunk_frames: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for (i, &frames) in chunk_frames.iter().enumerate() {
        if runs.last().map(|&(_, f)| f) != Some(frames) {
            runs.push((i as u32 + 1, frames));
        }
    }
    runs
}
