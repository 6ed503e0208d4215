//! In-memory fakes shared by unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::diagnostics::DropEvent;
use crate::models::error::RecordError;
use crate::models::media::{FrameSize, MediaTime, PcmBuffer, SampleUnit, TrackKind, TrackSettings, VideoSample, VideoSettings};
use crate::models::recording_result::RecordingResult;
use crate::models::state::{SessionState, SinkStatus};
use crate::traits::capture_source::{CaptureErrorCallback, CaptureSource, VideoSampleCallback};
use crate::traits::host_clock::HostClock;
use crate::traits::media_sink::{MediaSink, SinkFactory};
use crate::traits::recording_delegate::RecordingDelegate;

/// A clock stuck at one instant.
pub struct FixedClock(MediaTime);

impl FixedClock {
    pub fn at_secs(secs: f64) -> Self {
        Self(MediaTime::from_secs_f64(secs, 1_000_000_000))
    }
}

impl HostClock for FixedClock {
    fn now(&self) -> MediaTime {
        self.0
    }
}

/// A keyframe carrying a minimal `avcC` record.
pub fn key_frame(pts: MediaTime) -> VideoSample {
    VideoSample::new(pts, vec![0, 0, 0, 2, 0x65, 0x88], true).with_codec_config(vec![1, 0x64, 0, 0x1f, 0xff, 0xe0, 0])
}

/// 10 ms of mono 16 kHz silence.
pub fn mic_buffer(host_time: Option<MediaTime>) -> PcmBuffer {
    let buffer = PcmBuffer::from_i16(16_000.0, 1, &[0i16; 160]);
    match host_time {
        Some(t) => buffer.with_host_time(t),
        None => buffer,
    }
}

#[derive(Default)]
struct SourceState {
    display_size: FrameSize,
    start_error: Option<RecordError>,
    stop_error: Option<RecordError>,
    clock: Option<Arc<dyn HostClock>>,
    on_video: Option<VideoSampleCallback>,
    on_error: Option<CaptureErrorCallback>,
    starts: usize,
    stops: usize,
}

/// Capture source driven by the test. Clones share state.
#[derive(Clone, Default)]
pub struct FakeCaptureSource {
    state: Arc<Mutex<SourceState>>,
}

impl FakeCaptureSource {
    pub fn new(display_size: FrameSize) -> Self {
        let source = Self::default();
        source.state.lock().display_size = display_size;
        source
    }

    pub fn deny_permission(&self) {
        self.state.lock().start_error = Some(RecordError::PermissionDenied);
    }

    pub fn fail_stop(&self, error: RecordError) {
        self.state.lock().stop_error = Some(error);
    }

    pub fn emit_video(&self, sample: VideoSample) {
        let callback = self.state.lock().on_video.clone();
        if let Some(callback) = callback {
            callback(sample);
        }
    }

    pub fn emit_error(&self, error: RecordError) {
        let callback = self.state.lock().on_error.clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    /// Reading of the clock handed over by the last `start`.
    pub fn clock_now(&self) -> Option<MediaTime> {
        self.state.lock().clock.as_ref().map(|clock| clock.now())
    }

    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }
}

impl CaptureSource for FakeCaptureSource {
    fn is_available(&self) -> bool {
        true
    }

    fn display_size(&self) -> FrameSize {
        self.state.lock().display_size
    }

    fn start(
        &mut self,
        clock: Arc<dyn HostClock>,
        on_video: VideoSampleCallback,
        on_error: CaptureErrorCallback,
    ) -> Result<(), RecordError> {
        let mut state = self.state.lock();
        if let Some(ref error) = state.start_error {
            return Err(error.clone());
        }
        state.starts += 1;
        state.clock = Some(clock);
        state.on_video = Some(on_video);
        state.on_error = Some(on_error);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecordError> {
        let mut state = self.state.lock();
        state.stops += 1;
        state.on_video = None;
        state.on_error = None;
        match state.stop_error {
            Some(ref error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Everything the fake sinks were asked to do.
#[derive(Debug, Clone, Default)]
pub struct SinkLog {
    pub added: Vec<(TrackKind, TrackSettings)>,
    pub appended: Vec<(TrackKind, SampleUnit)>,
    pub finished: Vec<TrackKind>,
    pub started_at: Option<MediaTime>,
    pub finish_calls: usize,
}

#[derive(Default)]
struct SinkControl {
    log: SinkLog,
    not_ready: HashSet<TrackKind>,
    create_error: Option<RecordError>,
    finish_error: Option<RecordError>,
}

/// Factory for recording sinks that keep everything in a shared log.
#[derive(Clone, Default)]
pub struct FakeSinkFactory {
    control: Arc<Mutex<SinkControl>>,
}

impl FakeSinkFactory {
    pub fn log(&self) -> SinkLog {
        self.control.lock().log.clone()
    }

    pub fn video_settings(&self) -> Option<VideoSettings> {
        self.control
            .lock()
            .log
            .added
            .iter()
            .rev()
            .find_map(|(_, settings)| match settings {
                TrackSettings::Video(video) => Some(*video),
                TrackSettings::Audio(_) => None,
            })
    }

    pub fn set_ready(&self, kind: TrackKind, ready: bool) {
        let mut control = self.control.lock();
        if ready {
            control.not_ready.remove(&kind);
        } else {
            control.not_ready.insert(kind);
        }
    }

    pub fn fail_create(&self, error: RecordError) {
        self.control.lock().create_error = Some(error);
    }

    pub fn fail_finish(&self, error: RecordError) {
        self.control.lock().finish_error = Some(error);
    }
}

impl SinkFactory for FakeSinkFactory {
    fn create(&self, destination: &Path) -> Result<Box<dyn MediaSink>, RecordError> {
        if let Some(ref error) = self.control.lock().create_error {
            return Err(error.clone());
        }
        Ok(Box::new(FakeSink {
            path: destination.to_path_buf(),
            status: SinkStatus::Unknown,
            tracks: Vec::new(),
            finished: HashSet::new(),
            control: Arc::clone(&self.control),
        }))
    }
}

struct FakeSink {
    path: PathBuf,
    status: SinkStatus,
    tracks: Vec<TrackKind>,
    finished: HashSet<TrackKind>,
    control: Arc<Mutex<SinkControl>>,
}

impl MediaSink for FakeSink {
    fn add_track(&mut self, kind: TrackKind, settings: TrackSettings) -> Result<(), RecordError> {
        self.tracks.push(kind);
        self.control.lock().log.added.push((kind, settings));
        Ok(())
    }

    fn status(&self) -> SinkStatus {
        self.status.clone()
    }

    fn start_writing(&mut self, origin: MediaTime) -> Result<(), RecordError> {
        self.status = SinkStatus::Writing { origin };
        self.control.lock().log.started_at = Some(origin);
        Ok(())
    }

    fn is_ready_for_more_data(&self, kind: TrackKind) -> bool {
        self.status.is_writing()
            && self.tracks.contains(&kind)
            && !self.finished.contains(&kind)
            && !self.control.lock().not_ready.contains(&kind)
    }

    fn append(&mut self, kind: TrackKind, unit: SampleUnit) -> Result<(), RecordError> {
        self.control.lock().log.appended.push((kind, unit));
        Ok(())
    }

    fn mark_finished(&mut self, kind: TrackKind) {
        self.finished.insert(kind);
        self.control.lock().log.finished.push(kind);
    }

    fn finish(&mut self) -> Result<PathBuf, RecordError> {
        let mut control = self.control.lock();
        control.log.finish_calls += 1;
        if let Some(ref error) = control.finish_error {
            return Err(error.clone());
        }
        std::fs::write(&self.path, b"fake recording").map_err(|e| RecordError::StorageError(e.to_string()))?;
        self.status = SinkStatus::Completed;
        Ok(self.path.clone())
    }

    fn output_path(&self) -> &Path {
        &self.path
    }
}

/// Delegate that records every notification.
#[derive(Default)]
pub struct DelegateSpy {
    states: Mutex<Vec<&'static str>>,
    permissions: Mutex<Vec<Option<RecordError>>>,
    errors: Mutex<Vec<RecordError>>,
    drops: Mutex<Vec<DropEvent>>,
    finished: Mutex<Vec<RecordingResult>>,
}

impl DelegateSpy {
    pub fn states(&self) -> Vec<&'static str> {
        self.states.lock().clone()
    }

    pub fn permissions(&self) -> Vec<Option<RecordError>> {
        self.permissions.lock().clone()
    }

    pub fn errors(&self) -> Vec<RecordError> {
        self.errors.lock().clone()
    }

    pub fn drops(&self) -> Vec<DropEvent> {
        self.drops.lock().clone()
    }

    pub fn finished(&self) -> Vec<RecordingResult> {
        self.finished.lock().clone()
    }
}

impl RecordingDelegate for DelegateSpy {
    fn on_state_changed(&self, state: &SessionState) {
        self.states.lock().push(state.name());
    }

    fn on_permission(&self, error: Option<&RecordError>) {
        self.permissions.lock().push(error.cloned());
    }

    fn on_error(&self, error: &RecordError) {
        self.errors.lock().push(error.clone());
    }

    fn on_sample_dropped(&self, event: &DropEvent) {
        self.drops.lock().push(*event);
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}
