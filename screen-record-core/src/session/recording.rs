use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::capture::frame_source::FrameSource;
use crate::encoder::sink::EncoderSink;
use crate::gpu::context::GpuContextManager;
use crate::gpu::renderer::TextureRenderer;
use crate::models::config::RecordingConfiguration;
use crate::models::error::RecordError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, RenderDiagnostics};
use crate::models::state::SessionState;
use crate::render::render_loop::{CancelToken, RenderLoop, RenderLoopHandle};
use crate::storage::{checksum, metadata};
use crate::traits::capture_provider::{CaptureBinding, CaptureProvider};
use crate::traits::hardware_encoder::HardwareEncoder;
use crate::traits::recorder_backend::RecorderBackend;
use crate::traits::session_delegate::SessionDelegate;

/// Observable state of one session, shared with the orchestrator.
#[derive(Clone)]
pub struct SessionStatus {
    state: Arc<Mutex<SessionState>>,
    diagnostics: Arc<Mutex<RenderDiagnostics>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl SessionStatus {
    fn new(delegate: Option<Arc<dyn SessionDelegate>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
            diagnostics: Arc::new(Mutex::new(RenderDiagnostics::default())),
            delegate,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn diagnostics(&self) -> RenderDiagnostics {
        *self.diagnostics.lock()
    }

    fn set_state(&self, new_state: SessionState) {
        log::info!("session state -> {}", new_state.name());
        *self.state.lock() = new_state.clone();
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn fail(&self, error: &RecordError) {
        log::error!("recording session failed: {}", error);
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
        self.set_state(SessionState::Failed(error.clone()));
    }
}

/// Resources that exist once `Preparing` succeeded.
struct Prepared<B: RecorderBackend> {
    sink: EncoderSink<B::Encoder>,
    gpu: GpuContextManager<B::Device>,
    renderer: TextureRenderer,
}

/// Resources that exist while `Recording`.
struct Active<B: RecorderBackend> {
    sink: EncoderSink<B::Encoder>,
    gpu: GpuContextManager<B::Device>,
    render_loop: RenderLoopHandle,
    started_at: Instant,
}

/// One recording, from preparing to the sealed output file.
///
/// `run` consumes the session, so a stopped session can never be restarted.
///
/// ```text
/// [CaptureProvider] → [FrameSource] → [RenderLoop on gpu-render] → [EncoderSink surface] → file
/// ```
pub struct RecordingSession<P: CaptureProvider, B: RecorderBackend> {
    config: RecordingConfiguration,
    provider: P,
    backend: Arc<B>,
    status: SessionStatus,
    source: Arc<FrameSource>,
    draw_placeholder: Arc<AtomicBool>,
}

impl<P: CaptureProvider, B: RecorderBackend> RecordingSession<P, B> {
    pub fn new(
        config: RecordingConfiguration,
        provider: P,
        backend: Arc<B>,
        delegate: Option<Arc<dyn SessionDelegate>>,
    ) -> Self {
        Self {
            config,
            provider,
            backend,
            status: SessionStatus::new(delegate),
            source: FrameSource::new(),
            draw_placeholder: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.clone()
    }

    /// Token that requests the stop. Valid before and during `run`.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(Arc::clone(&self.source))
    }

    /// Drive the whole lifecycle on the calling thread.
    ///
    /// `started` is invoked exactly once: with `Ok` as soon as the render loop
    /// runs, or with the error if preparing failed. The call itself only
    /// returns after the session was cancelled and fully finalized.
    pub fn run<S>(mut self, started: S) -> Result<RecordingResult, RecordError>
    where
        S: FnOnce(Result<(), RecordError>),
    {
        self.status.set_state(SessionState::Preparing);

        let active = match self.prepare().and_then(|prepared| self.record(prepared)) {
            Ok(active) => active,
            Err(e) => {
                self.status.fail(&e);
                started(Err(e.clone()));
                return Err(e);
            }
        };
        started(Ok(()));

        let result = self.finish(active);
        if let Err(ref e) = result {
            self.status.fail(e);
        }
        result
    }

    /// `Preparing`: encoder sink, GPU context, render pipeline, capture binding.
    ///
    /// Either everything is acquired or nothing is left allocated.
    fn prepare(&mut self) -> Result<Prepared<B>, RecordError> {
        self.config.validate().map_err(RecordError::ConfigurationFailed)?;
        if !self.provider.is_available() {
            return Err(RecordError::ProviderUnavailable);
        }

        let encoder = self.backend.create_encoder()?;
        let output_path = self.output_path(encoder.container_extension())?;
        let sink = EncoderSink::open(encoder, &self.config.video_format(), output_path)?;

        let backend = Arc::clone(&self.backend);
        let gpu = match GpuContextManager::create(move || backend.create_device(), sink.input_surface()) {
            Ok(gpu) => gpu,
            Err(e) => {
                sink.discard();
                return Err(e);
            }
        };

        let (width, height) = (self.config.width, self.config.height);
        let placeholder = self.config.placeholder.clone();
        let renderer = match gpu
            .run(move |ctx| TextureRenderer::create_pipeline(ctx, width, height, &placeholder))
            .and_then(|created| created)
        {
            Ok(renderer) => renderer,
            Err(e) => {
                Self::shutdown_gpu(gpu, None);
                sink.discard();
                return Err(e);
            }
        };

        log::info!("binding capture provider '{}'", self.provider.name());
        if let Err(e) = self.provider.start(self.capture_binding()) {
            Self::shutdown_gpu(gpu, Some(renderer));
            sink.discard();
            return Err(e);
        }

        Ok(Prepared { sink, gpu, renderer })
    }

    /// `Recording`: start the encoder, then the render loop.
    fn record(&mut self, prepared: Prepared<B>) -> Result<Active<B>, RecordError> {
        let Prepared {
            mut sink,
            gpu,
            renderer,
        } = prepared;

        if let Err(e) = sink.start() {
            self.stop_provider();
            Self::shutdown_gpu(gpu, Some(renderer));
            sink.discard();
            return Err(e);
        }

        let render_loop = RenderLoop::start(
            &gpu,
            Arc::clone(&self.source),
            renderer,
            Arc::clone(&self.draw_placeholder),
            Arc::clone(&self.status.diagnostics),
        );
        self.status.set_state(SessionState::Recording);

        Ok(Active {
            sink,
            gpu,
            render_loop,
            started_at: Instant::now(),
        })
    }

    /// Block for the rest of the recording, then run `Stopping` and `Stopped`.
    ///
    /// Nothing interrupts this method once the render loop is gone: every
    /// teardown step runs even when an earlier one failed, and the first
    /// failure is reported.
    fn finish(&mut self, active: Active<B>) -> Result<RecordingResult, RecordError> {
        let Active {
            mut sink,
            gpu,
            render_loop,
            started_at,
        } = active;

        let renderer = render_loop.join();
        let duration_secs = started_at.elapsed().as_secs_f64();
        self.status.set_state(SessionState::Stopping);

        // Stop the capture feed before the encoder so no frame targets a dead surface.
        self.stop_provider();

        let mut first_error: Option<RecordError> = None;
        let mut note = |step: &str, outcome: Result<(), RecordError>| {
            if let Err(e) = outcome {
                log::error!("{} failed during finalization: {}", step, e);
                first_error.get_or_insert(e);
            }
        };

        note("encoder stop", sink.stop());
        match renderer {
            Ok(renderer) => note("gpu teardown", Self::shutdown_gpu(gpu, Some(renderer))),
            Err(e) => {
                note("render loop", Err(e));
                note("gpu teardown", Self::shutdown_gpu(gpu, None));
            }
        }
        note("encoder release", sink.release());

        let frames_encoded = sink.frames_encoded();
        let mime_type = sink.mime_type().to_owned();
        let file_path = sink.output_path().to_path_buf();
        drop(sink);

        if let Some(e) = first_error {
            return Err(e);
        }

        let diagnostics = self.status.diagnostics();
        let checksum = checksum::sha256_file(&file_path)?;
        let metadata = RecordingMetadata::new(
            &self.config.video_format(),
            &mime_type,
            &file_path.to_string_lossy(),
            duration_secs,
            frames_encoded,
            diagnostics.placeholder_frames,
            &checksum,
        );
        if self.config.write_metadata {
            metadata::write_metadata(&metadata, &file_path)?;
        }

        let result = RecordingResult {
            file_path,
            duration_secs,
            frames_drawn: diagnostics.frames_drawn,
            frames_encoded,
            checksum,
            metadata,
            exported_path: None,
        };

        log::info!(
            "recording finalized: {} ({} frames drawn, {} encoded, {} skipped)",
            result.file_path.display(),
            result.frames_drawn,
            result.frames_encoded,
            diagnostics.failed_cycles
        );
        self.status.set_state(SessionState::Stopped(Box::new(result.clone())));
        if let Some(ref delegate) = self.status.delegate {
            delegate.on_recording_finished(&result);
        }
        Ok(result)
    }

    // --- Internal helpers ---

    fn output_path(&self, extension: &str) -> Result<PathBuf, RecordError> {
        let directory = &self.config.output_directory;
        fs::create_dir_all(directory)
            .map_err(|e| RecordError::StorageError(format!("failed to create directory: {}", e)))?;
        let file_name = format!(
            "{}_{}.{}",
            self.config.file_prefix,
            chrono::Utc::now().timestamp_millis(),
            extension
        );
        Ok(directory.join(file_name))
    }

    fn capture_binding(&self) -> CaptureBinding {
        let placeholder = Arc::clone(&self.draw_placeholder);
        let delegate = self.status.delegate.clone();
        let token = self.cancel_token();

        CaptureBinding {
            width: self.config.width,
            height: self.config.height,
            on_frame: self.source.attach(),
            on_visibility_changed: Arc::new(move |visible| {
                log::info!("captured content {}", if visible { "visible" } else { "hidden" });
                placeholder.store(!visible, Ordering::Release);
                if let Some(ref delegate) = delegate {
                    delegate.on_content_visibility_changed(visible);
                }
            }),
            on_stopped: Arc::new(move || {
                log::warn!("capture grant revoked; stopping recording");
                token.cancel();
            }),
        }
    }

    fn stop_provider(&mut self) {
        if let Err(e) = self.provider.stop() {
            log::warn!("failed to release capture provider: {}", e);
        }
    }

    /// Destroy the renderer (if any) and release the context on the render thread.
    fn shutdown_gpu(gpu: GpuContextManager<B::Device>, renderer: Option<TextureRenderer>) -> Result<(), RecordError> {
        let destroyed = match renderer {
            Some(renderer) => gpu.run(move |ctx| renderer.destroy(ctx)),
            None => Ok(()),
        };
        let shutdown = gpu.shutdown();
        destroyed.and(shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::models::frame::CapturedFrame;
    use crate::test_support::{
        solid_frame, temp_dir, wait_until, MockBackend, MockProvider, RecordingDelegate,
    };

    fn config(dir: &std::path::Path) -> RecordingConfiguration {
        RecordingConfiguration {
            width: 16,
            height: 8,
            frame_rate: 30,
            output_directory: dir.to_path_buf(),
            file_prefix: "test".into(),
            ..Default::default()
        }
    }

    /// Run a session on its own thread, returning once it is recording.
    fn spawn_session(
        session: RecordingSession<MockProvider, MockBackend>,
    ) -> (
        CancelToken,
        SessionStatus,
        thread::JoinHandle<Result<RecordingResult, RecordError>>,
    ) {
        let token = session.cancel_token();
        let status = session.status();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || session.run(move |r| tx.send(r).unwrap()));
        rx.recv().unwrap().unwrap();
        (token, status, handle)
    }

    #[test]
    fn records_frames_and_finalizes_file() {
        let dir = temp_dir("session_basic");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        let delegate = RecordingDelegate::new();
        let session = RecordingSession::new(
            config(&dir),
            provider,
            Arc::clone(&backend),
            Some(delegate.clone() as Arc<dyn SessionDelegate>),
        );
        let (token, status, handle) = spawn_session(session);
        assert!(status.state().is_recording());

        for i in 1..=4u64 {
            controller.deliver(solid_frame(16, 8, [10, 20, 30, 255], i));
            assert!(wait_until(|| status.diagnostics().frames_drawn == i));
        }

        token.cancel();
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.frames_drawn, 4);
        assert_eq!(result.frames_encoded, 4);
        assert!(result.file_path.exists());
        assert_eq!(result.checksum.len(), 64);
        assert!(metadata::metadata_path(&result.file_path).exists());
        assert!(status.state().is_stopped());

        assert_eq!(
            delegate.state_names(),
            vec!["preparing", "recording", "stopping", "stopped"]
        );
        assert_eq!(delegate.finished_count(), 1);
        assert!(!controller.is_bound());
        assert_eq!(
            backend.encoder_log().calls(),
            vec!["configure", "start", "stop", "release"]
        );
        assert_eq!(backend.device_log().live_objects(), 0);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn capture_is_released_before_encoder_stops() {
        let dir = temp_dir("session_order");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        let events = controller.event_log();
        backend.encoder_log().share_events(events.clone());

        let session = RecordingSession::new(config(&dir), provider, Arc::clone(&backend), None);
        let (token, _, handle) = spawn_session(session);
        token.cancel();
        handle.join().unwrap().unwrap();

        let order = events.lock().clone();
        let provider_stop = order.iter().position(|e| e == "provider.stop").unwrap();
        let encoder_stop = order.iter().position(|e| e == "encoder.stop").unwrap();
        let encoder_release = order.iter().position(|e| e == "encoder.release").unwrap();
        assert!(provider_stop < encoder_stop);
        assert!(encoder_stop < encoder_release);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn immediate_stop_finalizes_an_empty_recording() {
        let dir = temp_dir("session_immediate");
        let (provider, _controller) = MockProvider::new();
        let session = RecordingSession::new(config(&dir), provider, MockBackend::new(), None);
        let (token, status, handle) = spawn_session(session);

        token.cancel();
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.frames_drawn, 0);
        assert!(result.file_path.exists());
        assert!(status.state().is_stopped());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn stop_requested_while_preparing_still_finalizes() {
        let dir = temp_dir("session_early_cancel");
        let (provider, _controller) = MockProvider::new();
        let session = RecordingSession::new(config(&dir), provider, MockBackend::new(), None);
        session.cancel_token().cancel();

        let result = session.run(|started| assert!(started.is_ok())).unwrap();
        assert_eq!(result.frames_drawn, 0);
        assert!(result.file_path.exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn revocation_follows_the_normal_stop_path() {
        let dir = temp_dir("session_revoked");
        let (provider, controller) = MockProvider::new();
        let session = RecordingSession::new(config(&dir), provider, MockBackend::new(), None);
        let (_, status, handle) = spawn_session(session);

        controller.deliver(solid_frame(16, 8, [1, 2, 3, 255], 1));
        assert!(wait_until(|| status.diagnostics().frames_drawn == 1));
        controller.revoke();

        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.frames_encoded, 1);
        assert!(status.state().is_stopped());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn hidden_content_switches_to_placeholder_until_visible_again() {
        let dir = temp_dir("session_visibility");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        let delegate = RecordingDelegate::new();
        let session = RecordingSession::new(
            config(&dir),
            provider,
            Arc::clone(&backend),
            Some(delegate.clone() as Arc<dyn SessionDelegate>),
        );
        let (token, status, handle) = spawn_session(session);

        let mut expected = 0;
        let mut step = |visible: Option<bool>| {
            if let Some(visible) = visible {
                controller.set_visible(visible);
            }
            expected += 1;
            controller.deliver(solid_frame(16, 8, [5, 5, 5, 255], expected));
            assert!(wait_until(|| status.diagnostics().frames_drawn == expected));
        };
        step(None);
        step(Some(false));
        step(None);
        step(Some(true));

        token.cancel();
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.metadata.placeholder_frames, 2);
        assert_eq!(delegate.visibility_changes(), vec![false, true]);

        let draws = backend.device_log().drawn_textures();
        assert_eq!(draws.len(), 4);
        assert_eq!(draws[0], draws[3]);
        assert_eq!(draws[1], draws[2]);
        assert_ne!(draws[0], draws[1]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn injected_draw_failure_does_not_end_recording() {
        let dir = temp_dir("session_draw_failure");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        backend.fail_draw_on(2);
        let session = RecordingSession::new(config(&dir), provider, Arc::clone(&backend), None);
        let (token, status, handle) = spawn_session(session);

        for i in 1..=3u64 {
            controller.deliver(solid_frame(16, 8, [0, 0, 0, 255], i));
            assert!(wait_until(|| status.diagnostics().frames_signaled == i));
        }

        token.cancel();
        let result = handle.join().unwrap().unwrap();
        assert_eq!(result.frames_drawn, 2);
        assert_eq!(result.frames_encoded, 2);
        assert_eq!(status.diagnostics().failed_cycles, 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_provider_frames_are_skipped() {
        let dir = temp_dir("session_malformed_frames");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        let session = RecordingSession::new(config(&dir), provider, Arc::clone(&backend), None);
        let (token, status, handle) = spawn_session(session);

        controller.deliver(solid_frame(16, 8, [40, 40, 40, 255], 1));
        assert!(wait_until(|| status.diagnostics().frames_drawn == 1));
        controller.deliver(CapturedFrame::new(0, 0, Vec::new(), 2));
        controller.deliver(CapturedFrame::new(16, 8, vec![0u8; 7], 3));
        controller.deliver(solid_frame(16, 8, [80, 80, 80, 255], 4));
        assert!(wait_until(|| status.diagnostics().frames_drawn == 2));

        token.cancel();
        let result = handle.join().unwrap().unwrap();
        assert!(status.state().is_stopped());
        assert_eq!(result.frames_encoded, 2);
        assert_eq!(status.diagnostics().frames_signaled, 2);
        assert_eq!(status.diagnostics().failed_cycles, 0);
        assert_eq!(backend.device_log().latched_timestamps(), vec![1, 4]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn setup_failures_leave_nothing_allocated() {
        #[derive(Clone, Copy, Debug)]
        enum Failure {
            Encoder,
            Device,
            Upload,
            Provider,
        }

        for failure in [Failure::Encoder, Failure::Device, Failure::Upload, Failure::Provider] {
            let dir = temp_dir("session_setup_failure");
            let (provider, controller) = MockProvider::new();
            let backend = MockBackend::new();
            match failure {
                Failure::Encoder => backend.fail_configure(),
                Failure::Device => backend.fail_device(),
                Failure::Upload => backend.fail_upload(),
                Failure::Provider => controller.fail_start(),
            }
            let delegate = RecordingDelegate::new();
            let session = RecordingSession::new(
                config(&dir),
                provider,
                Arc::clone(&backend),
                Some(delegate.clone() as Arc<dyn SessionDelegate>),
            );
            let status = session.status();

            let mut reported = None;
            let result = session.run(|started| reported = Some(started));
            assert!(result.is_err(), "{:?} should fail", failure);
            assert_eq!(reported.unwrap().err(), result.clone().err());
            assert!(matches!(status.state(), SessionState::Failed(_)));
            assert_eq!(delegate.error_count(), 1);

            let encoder_calls = backend.encoder_log().calls();
            if !encoder_calls.is_empty() {
                assert_eq!(encoder_calls.last().map(String::as_str), Some("release"));
            }
            assert_eq!(backend.device_log().live_objects(), 0, "{:?}", failure);
            assert!(!backend.device_log().is_live(), "{:?}", failure);
            assert!(!controller.is_bound());
            let leftovers = fs::read_dir(&dir).map(|d| d.count()).unwrap_or(0);
            assert_eq!(leftovers, 0, "{:?} left a partial file", failure);

            fs::remove_dir_all(&dir).ok();
        }
    }

    #[test]
    fn invalid_configuration_fails_before_touching_the_backend() {
        let dir = temp_dir("session_bad_config");
        let (provider, _) = MockProvider::new();
        let backend = MockBackend::new();
        let mut bad = config(&dir);
        bad.width = 15;
        let session = RecordingSession::new(bad, provider, Arc::clone(&backend), None);

        let result = session.run(|_| {});
        assert!(matches!(result, Err(RecordError::ConfigurationFailed(_))));
        assert!(backend.encoder_log().calls().is_empty());
    }

    #[test]
    fn unavailable_provider_is_a_setup_failure() {
        let dir = temp_dir("session_unavailable");
        let (provider, controller) = MockProvider::new();
        controller.set_available(false);
        let session = RecordingSession::new(config(&dir), provider, MockBackend::new(), None);
        assert_eq!(session.run(|_| {}).err(), Some(RecordError::ProviderUnavailable));
    }

    #[test]
    fn encoder_flush_failure_is_reported_after_full_teardown() {
        let dir = temp_dir("session_flush_failure");
        let (provider, controller) = MockProvider::new();
        let backend = MockBackend::new();
        backend.fail_stop();
        let session = RecordingSession::new(config(&dir), provider, Arc::clone(&backend), None);
        let (token, status, handle) = spawn_session(session);

        thread::sleep(Duration::from_millis(10));
        token.cancel();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(RecordError::EncoderError(_))));
        assert!(matches!(status.state(), SessionState::Failed(_)));
        assert_eq!(backend.encoder_log().calls().last().map(String::as_str), Some("release"));
        assert!(!backend.device_log().is_live());
        assert!(!controller.is_bound());

        fs::remove_dir_all(&dir).ok();
    }
}
