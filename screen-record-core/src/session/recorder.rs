use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::config::RecordingConfiguration;
use crate::models::error::RecordError;
use crate::models::recording_result::{RecordingResult, RenderDiagnostics};
use crate::models::state::SessionState;
use crate::render::render_loop::CancelToken;
use crate::session::recording::{RecordingSession, SessionStatus};
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::exporter::RecordingExporter;
use crate::traits::recorder_backend::RecorderBackend;
use crate::traits::session_delegate::SessionDelegate;

struct ActiveSession {
    cancel: CancelToken,
    thread: thread::JoinHandle<Result<RecordingResult, RecordError>>,
}

/// Orchestrator-facing start/stop interface.
///
/// Each `start_record` builds a fresh [`RecordingSession`] and runs it on a
/// dedicated `recording-session` thread. `stop_record` cancels that session
/// and joins it, so it returns only once the output file is sealed and the
/// encoder released. Finalization runs on the session thread and cannot be
/// cut short by the caller.
pub struct ScreenRecorder<B: RecorderBackend> {
    backend: Arc<B>,
    config: RecordingConfiguration,
    delegate: Option<Arc<dyn SessionDelegate>>,
    exporter: Option<Arc<dyn RecordingExporter>>,
    active: Mutex<Option<ActiveSession>>,
    last_status: Mutex<Option<SessionStatus>>,
}

impl<B: RecorderBackend> ScreenRecorder<B> {
    pub fn new(backend: Arc<B>, config: RecordingConfiguration) -> Self {
        Self {
            backend,
            config,
            delegate: None,
            exporter: None,
            active: Mutex::new(None),
            last_status: Mutex::new(None),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Collaborator that moves the finished file into shared storage.
    pub fn set_exporter(&mut self, exporter: Arc<dyn RecordingExporter>) {
        self.exporter = Some(exporter);
    }

    pub fn config(&self) -> &RecordingConfiguration {
        &self.config
    }

    /// State of the current or most recent session.
    pub fn state(&self) -> SessionState {
        self.last_status
            .lock()
            .as_ref()
            .map(SessionStatus::state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn diagnostics(&self) -> RenderDiagnostics {
        self.last_status
            .lock()
            .as_ref()
            .map(SessionStatus::diagnostics)
            .unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().is_some() && self.state().is_recording()
    }

    /// Start recording from `provider`, which stands for an obtained capture grant.
    ///
    /// Returns once frames are being consumed, or with the preparing error.
    /// In the error case nothing stays allocated.
    pub fn start_record<P>(&self, provider: P) -> Result<(), RecordError>
    where
        P: CaptureProvider + 'static,
    {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(RecordError::AlreadyRecording);
        }

        let session = RecordingSession::new(
            self.config.clone(),
            provider,
            Arc::clone(&self.backend),
            self.delegate.clone(),
        );
        let cancel = session.cancel_token();
        *self.last_status.lock() = Some(session.status());

        let (started_tx, started_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("recording-session".into())
            .spawn(move || {
                session.run(move |started| {
                    let _ = started_tx.send(started);
                })
            })
            .map_err(|e| RecordError::Unknown(format!("failed to spawn session thread: {}", e)))?;

        match started_rx.recv() {
            Ok(Ok(())) => {
                *active = Some(ActiveSession { cancel, thread: handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(Self::join_session(handle)
                .err()
                .unwrap_or_else(|| RecordError::Unknown("session ended before starting".into()))),
        }
    }

    /// Stop the recording and wait until it is fully finalized.
    ///
    /// A concurrent second call waits for the first one and then returns
    /// `NotRecording`. When an exporter is configured it runs after the
    /// session reached `Stopped`.
    pub fn stop_record(&self) -> Result<RecordingResult, RecordError> {
        let mut active = self.active.lock();
        let session = active.take().ok_or(RecordError::NotRecording)?;

        session.cancel.cancel();
        let mut result = Self::join_session(session.thread)?;
        drop(active);

        if let Some(ref exporter) = self.exporter {
            match exporter.export(&result) {
                Ok(path) => {
                    log::info!("recording exported to {}", path.display());
                    result.exported_path = Some(path);
                }
                Err(e) => {
                    log::error!(
                        "export failed, recording left at {}: {}",
                        result.file_path.display(),
                        e
                    );
                    if let Some(ref delegate) = self.delegate {
                        delegate.on_error(&e);
                    }
                    return Err(e);
                }
            }
        }
        Ok(result)
    }

    fn join_session(
        handle: thread::JoinHandle<Result<RecordingResult, RecordError>>,
    ) -> Result<RecordingResult, RecordError> {
        handle
            .join()
            .map_err(|_| RecordError::Unknown("recording session thread panicked".into()))?
    }
}

impl<B: RecorderBackend> Drop for ScreenRecorder<B> {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            log::warn!("screen recorder dropped while recording; finalizing");
            session.cancel.cancel();
            if let Err(e) = Self::join_session(session.thread) {
                log::error!("finalization on drop failed: {}", e);
            }
        }
    }
}
