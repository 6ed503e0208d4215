use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::SessionConfiguration;
use crate::models::diagnostics::{DropEvent, DropReason, SessionDiagnostics};
use crate::models::error::RecordError;
use crate::models::media::{
    FrameSize, MediaTime, PcmBuffer, SampleUnit, TrackKind, TrackSettings, VideoSample, VideoSettings,
};
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::{SessionState, SinkStatus};
use crate::processing::audio_adapter::AudioSampleAdapter;
use crate::processing::ring_buffer::RingBuffer;
use crate::storage::mp4_writer::Mp4SinkFactory;
use crate::storage::{checksum, destination, metadata};
use crate::traits::capture_source::{CaptureErrorCallback, CaptureSource, VideoSampleCallback};
use crate::traits::host_clock::{HostClock, MonotonicClock};
use crate::traits::media_library::MediaLibrary;
use crate::traits::media_sink::{MediaSink, SinkFactory};
use crate::traits::recording_delegate::RecordingDelegate;

/// Sink, tracks and counters of the running session.
///
/// Every state transition and append happens under one lock, which gives a
/// total order between "sample arrives" and "session stops".
struct Pipeline {
    state: SessionState,
    config: SessionConfiguration,
    sink: Option<Box<dyn MediaSink>>,
    adapter: AudioSampleAdapter,
    tracks: Vec<TrackKind>,
    frame_size: FrameSize,
    output_path: Option<PathBuf>,
    diagnostics: SessionDiagnostics,
    drop_history: RingBuffer<DropEvent>,
    origin: Option<MediaTime>,
    last_sample_end: Option<MediaTime>,
}

impl Pipeline {
    fn new(clock: Arc<dyn HostClock>) -> Self {
        let config = SessionConfiguration::default();
        Self {
            adapter: AudioSampleAdapter::new(clock, config.timestamp_policy),
            drop_history: RingBuffer::new(config.drop_history),
            state: SessionState::Idle,
            config,
            sink: None,
            tracks: Vec::new(),
            frame_size: FrameSize::new(0, 0),
            output_path: None,
            diagnostics: SessionDiagnostics::default(),
            origin: None,
            last_sample_end: None,
        }
    }

    fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.contains(&kind)
    }

    fn drop_sample(&mut self, track: TrackKind, reason: DropReason, pts: Option<MediaTime>) -> DropEvent {
        let event = DropEvent { track, reason, pts };
        log::trace!("Dropped {} sample: {:?}", track, reason);
        self.diagnostics.track_mut(track).samples_dropped += 1;
        self.drop_history.push(event);
        event
    }

    fn record_append(&mut self, track: TrackKind, frames: u32, end: MediaTime) {
        let stats = self.diagnostics.track_mut(track);
        stats.samples_appended += 1;
        stats.frames_appended += frames as u64;
        if self.last_sample_end.map_or(true, |last| end > last) {
            self.last_sample_end = Some(end);
        }
    }

    /// Video path: the first sample on an unknown sink anchors time zero.
    fn accept_video(&mut self, sample: VideoSample) -> Option<DropEvent> {
        let pts = sample.pts;
        if !self.state.is_recording() {
            return Some(self.drop_sample(TrackKind::Video, DropReason::SessionInactive, Some(pts)));
        }
        let Some(sink) = self.sink.as_mut() else {
            return Some(self.drop_sample(TrackKind::Video, DropReason::SessionInactive, Some(pts)));
        };

        if sink.status() == SinkStatus::Unknown {
            match sink.start_writing(pts) {
                Ok(()) => {
                    log::info!("Recording anchored at {}", pts);
                    self.origin = Some(pts);
                }
                Err(e) => {
                    log::warn!("Failed to start writing: {}", e);
                    return Some(self.drop_sample(TrackKind::Video, DropReason::AppendFailed, Some(pts)));
                }
            }
        }

        self.append(TrackKind::Video, SampleUnit::from(sample))
    }

    /// Audio path: convert, then append if the sink is writing and the track ready.
    fn accept_audio(&mut self, kind: TrackKind, buffer: &PcmBuffer) -> Option<DropEvent> {
        if !self.has_track(kind) {
            return None;
        }
        if !self.state.is_recording() {
            return Some(self.drop_sample(kind, DropReason::SessionInactive, buffer.host_time));
        }

        let unit = match self.adapter.convert(buffer) {
            Ok(unit) => unit,
            Err(e) => {
                log::trace!("Audio conversion failed: {}", e);
                return Some(self.drop_sample(kind, DropReason::ConversionFailed, buffer.host_time));
            }
        };

        if let Some(origin) = self.origin {
            if unit.pts < origin {
                return Some(self.drop_sample(kind, DropReason::BeforeSessionStart, Some(unit.pts)));
            }
        }
        self.append(kind, unit)
    }

    fn append(&mut self, kind: TrackKind, unit: SampleUnit) -> Option<DropEvent> {
        let pts = unit.pts;
        let Some(sink) = self.sink.as_mut() else {
            return Some(self.drop_sample(kind, DropReason::SessionInactive, Some(pts)));
        };
        if !sink.status().is_writing() {
            return Some(self.drop_sample(kind, DropReason::SinkNotWriting, Some(pts)));
        }
        if !sink.is_ready_for_more_data(kind) {
            return Some(self.drop_sample(kind, DropReason::TrackNotReady, Some(pts)));
        }

        let frames = unit.sample_count;
        let end = if kind.is_audio() {
            let total = unit.total_duration();
            MediaTime::new(pts.rescale(total.timescale).saturating_add(total.value), total.timescale)
        } else {
            pts
        };
        match sink.append(kind, unit) {
            Ok(()) => {
                self.record_append(kind, frames, end);
                None
            }
            Err(e) => {
                log::debug!("Append to {} track failed: {}", kind, e);
                Some(self.drop_sample(kind, DropReason::AppendFailed, Some(pts)))
            }
        }
    }

    fn snapshot(&self) -> SessionDiagnostics {
        SessionDiagnostics {
            recent_drops: self.drop_history.snapshot(),
            ..self.diagnostics.clone()
        }
    }

    fn duration_secs(&self) -> f64 {
        match (self.origin, self.last_sample_end) {
            (Some(origin), Some(end)) => end.saturating_sub(&origin).as_secs_f64().max(0.0),
            _ => 0.0,
        }
    }

    /// Mark every registered track finished once and finalize the sink.
    fn finalize(&mut self) -> Result<PathBuf, RecordError> {
        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| RecordError::InvalidState("no sink to finalize".into()))?;
        for &kind in &self.tracks {
            sink.mark_finished(kind);
        }
        sink.finish().map_err(|e| match e {
            RecordError::FinalizeFailed(_) => e,
            other => RecordError::FinalizeFailed(other.to_string()),
        })
    }
}

/// Routes samples from the capture source and the caller into the pipeline,
/// notifying the delegate outside the lock.
#[derive(Clone)]
struct SampleRouter {
    pipeline: Arc<Mutex<Pipeline>>,
    delegate: Option<Arc<dyn RecordingDelegate>>,
}

impl SampleRouter {
    fn handle_video(&self, sample: VideoSample) {
        let dropped = self.pipeline.lock().accept_video(sample);
        self.notify_drop(dropped);
    }

    fn handle_audio(&self, kind: TrackKind, buffer: &PcmBuffer) {
        let dropped = self.pipeline.lock().accept_audio(kind, buffer);
        self.notify_drop(dropped);
    }

    fn handle_capture_error(&self, error: RecordError) {
        log::error!("Capture pipeline error: {}", error);
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
    }

    fn notify_drop(&self, dropped: Option<DropEvent>) {
        if let (Some(event), Some(delegate)) = (dropped, self.delegate.as_ref()) {
            delegate.on_sample_dropped(&event);
        }
    }
}

/// Screen recording session.
///
/// Owns one capture source, one sink with a video track and up to two audio
/// tracks, and bridges samples between them:
/// ```text
/// [CaptureSource] ── video ─────────────────────────→ ┐
/// feed_microphone_audio → [AudioSampleAdapter] ─────→ ├→ [MediaSink] → file
/// feed_application_audio → [AudioSampleAdapter] ────→ ┘
/// ```
/// All operations take `&self` and may be called from any thread.
pub struct RecordingSession<C: CaptureSource> {
    source: Mutex<C>,
    sink_factory: Arc<dyn SinkFactory>,
    library: Option<Arc<dyn MediaLibrary>>,
    clock: Arc<dyn HostClock>,
    router: SampleRouter,
    // Serializes begin/end against each other.
    lifecycle: Mutex<()>,
}

impl<C: CaptureSource> RecordingSession<C> {
    pub fn new(source: C) -> Self {
        let clock: Arc<dyn HostClock> = Arc::new(MonotonicClock);
        Self {
            source: Mutex::new(source),
            sink_factory: Arc::new(Mp4SinkFactory),
            library: None,
            router: SampleRouter {
                pipeline: Arc::new(Mutex::new(Pipeline::new(Arc::clone(&clock)))),
                delegate: None,
            },
            clock,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_sink_factory(mut self, factory: Arc<dyn SinkFactory>) -> Self {
        self.sink_factory = factory;
        self
    }

    pub fn with_media_library(mut self, library: Arc<dyn MediaLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn HostClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn RecordingDelegate>) {
        self.router.delegate = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.router.pipeline.lock().state.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.router.pipeline.lock().snapshot()
    }

    /// Output location resolved by the last `begin`.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.router.pipeline.lock().output_path.clone()
    }

    /// Frame size of the video track registered by the last `begin`.
    pub fn frame_size(&self) -> Option<FrameSize> {
        let pipeline = self.router.pipeline.lock();
        pipeline.has_track(TrackKind::Video).then_some(pipeline.frame_size)
    }

    /// Start a recording.
    ///
    /// Setup failures are reported once through `on_error` and returned.
    /// The capture permission outcome is reported once through `on_permission`.
    pub fn begin(&self, config: SessionConfiguration) -> Result<(), RecordError> {
        let _lifecycle = self.lifecycle.lock();

        if !self.router.pipeline.lock().state.can_begin() {
            return Err(RecordError::InvalidState("a recording is already active".into()));
        }

        if let Err(e) = self.prepare(config) {
            self.report_error(&e);
            self.set_state(SessionState::Failed(e.clone()));
            return Err(e);
        }
        self.set_state(SessionState::Recording);

        let on_video: VideoSampleCallback = {
            let router = self.router.clone();
            Arc::new(move |sample| router.handle_video(sample))
        };
        let on_error: CaptureErrorCallback = {
            let router = self.router.clone();
            Arc::new(move |error| router.handle_capture_error(error))
        };

        let started = self
            .source
            .lock()
            .start(Arc::clone(&self.clock), on_video, on_error);
        if let Some(ref delegate) = self.router.delegate {
            delegate.on_permission(started.as_ref().err());
        }

        if let Err(e) = started {
            log::error!("Failed to start capture: {}", e);
            self.abandon();
            self.set_state(SessionState::Failed(e.clone()));
            return Err(e);
        }

        log::info!("Recording started");
        Ok(())
    }

    /// Push a microphone buffer. No-op if the session has no microphone track.
    pub fn feed_microphone_audio(&self, buffer: &PcmBuffer) {
        self.router.handle_audio(TrackKind::Microphone, buffer);
    }

    /// Push an application audio buffer. No-op if the session has no application track.
    pub fn feed_application_audio(&self, buffer: &PcmBuffer) {
        self.router.handle_audio(TrackKind::Application, buffer);
    }

    /// Stop capture, finish every track and finalize the file.
    ///
    /// Transitions: recording → stopping → completed/failed.
    pub fn end(&self) -> Result<RecordingResult, RecordError> {
        let _lifecycle = self.lifecycle.lock();

        {
            let mut pipeline = self.router.pipeline.lock();
            if !pipeline.state.is_recording() {
                return Err(RecordError::InvalidState("no active recording".into()));
            }
            pipeline.state = SessionState::Stopping;
        }
        self.notify_state(&SessionState::Stopping);

        if let Err(e) = self.source.lock().stop() {
            log::warn!("Failed to stop capture source: {}", e);
        }

        let (finalized, config, frame_size, tracks, duration_secs, diagnostics) = {
            let mut pipeline = self.router.pipeline.lock();
            let finalized = pipeline.finalize();
            let tracks = std::mem::take(&mut pipeline.tracks);
            (
                finalized,
                pipeline.config.clone(),
                pipeline.frame_size,
                tracks,
                pipeline.duration_secs(),
                pipeline.snapshot(),
            )
        };

        let result = finalized.and_then(|file_path| {
            let checksum = checksum::sha256_file(&file_path)?;
            let metadata = RecordingMetadata::new(
                duration_secs,
                &file_path.to_string_lossy(),
                &checksum,
                frame_size,
                tracks,
                diagnostics.total_dropped(),
            );
            if config.write_metadata {
                if let Err(e) = metadata::write_metadata(&metadata, &file_path) {
                    log::warn!("Failed to write metadata sidecar: {}", e);
                }
            }
            let gallery = config.save_to_gallery.then(|| self.save_to_gallery(&file_path));

            Ok(RecordingResult {
                file_path,
                duration_secs,
                metadata,
                checksum,
                diagnostics,
                gallery,
            })
        });

        match result {
            Ok(result) => {
                log::info!(
                    "Recording finished: {} ({:.2}s, {} samples dropped)",
                    result.file_path.display(),
                    result.duration_secs,
                    result.diagnostics.total_dropped()
                );
                self.set_state(SessionState::Completed(Box::new(result.clone())));
                if let Some(ref delegate) = self.router.delegate {
                    delegate.on_recording_finished(&result);
                }
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed to finalize recording: {}", e);
                self.report_error(&e);
                self.set_state(SessionState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    // --- Internal helpers ---

    /// Resolve the destination, create the sink and register tracks.
    fn prepare(&self, config: SessionConfiguration) -> Result<(), RecordError> {
        config.validate().map_err(RecordError::ConfigurationFailed)?;
        if config.save_to_gallery && self.library.is_none() {
            return Err(RecordError::ConfigurationFailed(
                "saving to the gallery requires a media library".into(),
            ));
        }
        if !self.source.lock().is_available() {
            return Err(RecordError::SourceNotAvailable);
        }
        self.set_state(SessionState::Starting);

        let frame_size = config
            .frame_size
            .unwrap_or_else(|| self.source.lock().display_size());
        if !frame_size.is_valid() {
            return Err(RecordError::ConfigurationFailed(format!(
                "display size {}x{} is not a valid frame size",
                frame_size.width, frame_size.height
            )));
        }

        let path = destination::resolve_destination(config.destination.as_deref(), config.output_directory.as_deref())?;

        let mut sink = self.sink_factory.create(&path)?;

        let mut tracks = vec![TrackKind::Video];
        if config.enable_microphone {
            tracks.push(TrackKind::Microphone);
        }
        if config.enable_application_audio {
            tracks.push(TrackKind::Application);
        }
        for &kind in &tracks {
            let settings = match kind {
                TrackKind::Video => TrackSettings::Video(VideoSettings {
                    codec: config.video_codec,
                    size: frame_size,
                }),
                TrackKind::Microphone | TrackKind::Application => TrackSettings::Audio(config.audio_format),
            };
            sink.add_track(kind, settings)?;
        }
        log::info!(
            "Prepared {} ({}x{}, tracks: {:?})",
            path.display(),
            frame_size.width,
            frame_size.height,
            tracks
        );

        let mut pipeline = self.router.pipeline.lock();
        pipeline.adapter = AudioSampleAdapter::new(Arc::clone(&self.clock), config.timestamp_policy);
        pipeline.drop_history = RingBuffer::new(config.drop_history);
        pipeline.diagnostics = SessionDiagnostics::default();
        pipeline.sink = Some(sink);
        pipeline.tracks = tracks;
        pipeline.frame_size = frame_size;
        pipeline.output_path = Some(path);
        pipeline.origin = None;
        pipeline.last_sample_end = None;
        pipeline.config = config;
        Ok(())
    }

    /// Drop the sink after a failed start and remove its partial file.
    fn abandon(&self) {
        let mut pipeline = self.router.pipeline.lock();
        pipeline.sink = None;
        pipeline.tracks.clear();
        if let Some(ref path) = pipeline.output_path {
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("No partial file removed at {}: {}", path.display(), e);
            }
        }
    }

    fn save_to_gallery(&self, path: &std::path::Path) -> Result<PathBuf, RecordError> {
        let library = self
            .library
            .as_ref()
            .ok_or_else(|| RecordError::ConfigurationFailed("no media library attached".into()))?;

        let saved = if library.request_access() {
            library.save_video(path)
        } else {
            Err(RecordError::LibraryAccessDenied)
        };
        if let Err(ref e) = saved {
            log::warn!("Failed to save recording to library: {}", e);
            self.report_error(e);
        }
        saved
    }

    fn set_state(&self, new_state: SessionState) {
        self.router.pipeline.lock().state = new_state.clone();
        self.notify_state(&new_state);
    }

    fn notify_state(&self, state: &SessionState) {
        log::debug!("Session state: {}", state.name());
        if let Some(ref delegate) = self.router.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn report_error(&self, error: &RecordError) {
        if let Some(ref delegate) = self.router.delegate {
            delegate.on_error(error);
        }
    }
}

impl<C: CaptureSource> Drop for RecordingSession<C> {
    fn drop(&mut self) {
        if self.router.pipeline.lock().state.is_recording() {
            log::warn!("Recording session dropped while active; stopping capture without finalizing");
            if let Err(e) = self.source.get_mut().stop() {
                log::warn!("Failed to stop capture source: {}", e);
            }
        }
    }
}
