//! Capture session lifecycle
//!
//! A [`Session`] exclusively owns one camera capture and one detection
//! worker for as long as it lives. Both are acquired on their own threads,
//! so starting a session never blocks the caller. [`Pipeline`] is the
//! start/stop state machine the UI drives: at most one session exists at any
//! time, and a starting session is promoted to active once the camera and
//! the detector both report ready.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::camera::{BackendOpener, CameraCapture, CameraError, CameraFrame};
use crate::channel::newest_wins;
use crate::detector::{DetectionResult, DetectionWorker, DetectorError, DetectorOpener};

/// Shown when the camera cannot be started
const CAMERA_START_MESSAGE: &str = "카메라를 시작할 수 없습니다. 카메라 권한을 확인해주세요.";
/// Shown when the face model cannot be loaded
const DETECTOR_START_MESSAGE: &str = "얼굴 인식 모델을 불러올 수 없습니다. 모델 파일을 확인해주세요.";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Camera: {0}")]
    Camera(#[from] CameraError),
    #[error("Detector: {0}")]
    Detector(#[from] DetectorError),
}

impl SessionError {
    /// Message for the UI
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Camera(_) => CAMERA_START_MESSAGE,
            SessionError::Detector(_) => DETECTOR_START_MESSAGE,
        }
    }
}

/// Per-resource outcome of a session teardown
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub camera: Option<CameraError>,
    pub detector: Option<DetectorError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.camera.is_none() && self.detector.is_none()
    }
}

/// Builds the resources a session owns. Both openers run on the threads
/// that own the resource.
pub trait SessionFactory {
    fn detector(&self) -> DetectorOpener;
    fn camera(&self) -> BackendOpener;
}

/// Progress of a session's resource acquisition
#[derive(Debug)]
pub enum Startup {
    Pending,
    Ready,
    Failed(SessionError),
}

pub struct Session {
    camera: Option<CameraCapture>,
    worker: Option<DetectionWorker>,
    results: Receiver<DetectionResult>,
}

impl Session {
    /// Spawn the detection worker and the capture thread. The model load and
    /// the device open proceed concurrently in the background; only a failed
    /// thread spawn is reported here.
    pub fn start(factory: &dyn SessionFactory) -> Result<Self, SessionError> {
        let (frame_tx, frame_rx) = newest_wins::<Arc<CameraFrame>>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let worker = DetectionWorker::start(factory.detector(), frame_rx, result_tx)?;

        let camera = match CameraCapture::start(factory.camera(), frame_tx) {
            Ok(camera) => camera,
            Err(e) => {
                let mut worker = worker;
                if let Err(close) = worker.stop() {
                    log::error!("Failed to release detector after camera error: {}", close);
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            camera: Some(camera),
            worker: Some(worker),
            results: result_rx,
        })
    }

    /// Check both resources; the first failure wins
    pub fn poll_startup(&mut self) -> Startup {
        let detector = match self.worker.as_mut().and_then(DetectionWorker::poll_ready) {
            Some(Err(e)) => return Startup::Failed(e.into()),
            ready => ready.is_some(),
        };
        let camera = match self.camera.as_mut().and_then(CameraCapture::poll_ready) {
            Some(Err(e)) => return Startup::Failed(e.into()),
            ready => ready.is_some(),
        };
        if detector && camera {
            Startup::Ready
        } else {
            Startup::Pending
        }
    }

    pub fn camera(&self) -> Option<&CameraCapture> {
        self.camera.as_ref()
    }

    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.camera.as_ref().and_then(|c| c.latest_frame())
    }

    /// Newest pending detection result; older ones are skipped
    pub fn poll(&self) -> Option<DetectionResult> {
        self.results.try_iter().last()
    }

    /// Release the camera and the detector independently
    pub fn stop(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop() {
                log::error!("Failed to stop camera: {}", e);
                report.camera = Some(e);
            }
        }
        if let Some(mut worker) = self.worker.take() {
            if let Err(e) = worker.stop() {
                log::error!("Failed to close detector: {}", e);
                report.detector = Some(e);
            }
        }

        // Results still queued belong to the stopped session
        while self.results.try_recv().is_ok() {}
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

enum PipelineState {
    Stopped,
    Starting(Session),
    Active(Session),
}

/// Start/stop state machine driven by the UI
pub struct Pipeline {
    state: PipelineState,
    error: Option<String>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Stopped,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PipelineState::Active(_))
    }

    /// Resources are still being acquired
    pub fn is_starting(&self) -> bool {
        matches!(self.state, PipelineState::Starting(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            PipelineState::Active(session) => Some(session),
            PipelineState::Starting(_) | PipelineState::Stopped => None,
        }
    }

    /// User-facing message from the last failed start
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Begin a new session, tearing down a running or starting one first.
    /// Returns as soon as the session's threads are spawned; call
    /// [`Pipeline::update`] until the start settles.
    pub fn start(&mut self, factory: &dyn SessionFactory) -> Result<(), SessionError> {
        self.stop();

        match Session::start(factory) {
            Ok(session) => {
                self.error = None;
                self.state = PipelineState::Starting(session);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Advance a starting session. Returns the outcome once, when the start
    /// settles; a failed start leaves the pipeline stopped with no retry.
    pub fn update(&mut self) -> Option<Result<(), SessionError>> {
        let PipelineState::Starting(session) = &mut self.state else {
            return None;
        };
        match session.poll_startup() {
            Startup::Pending => None,
            Startup::Ready => {
                if let PipelineState::Starting(session) =
                    std::mem::replace(&mut self.state, PipelineState::Stopped)
                {
                    log::info!(
                        "Session started with camera '{}'",
                        session.camera().and_then(CameraCapture::name).unwrap_or("?")
                    );
                    self.state = PipelineState::Active(session);
                }
                Some(Ok(()))
            }
            Startup::Failed(e) => {
                self.stop();
                Some(self.fail(e))
            }
        }
    }

    fn fail(&mut self, e: SessionError) -> Result<(), SessionError> {
        log::error!("Failed to start session: {}", e);
        self.error = Some(e.user_message().to_string());
        Err(e)
    }

    /// Stop the running or starting session, if any
    pub fn stop(&mut self) -> Option<TeardownReport> {
        match std::mem::replace(&mut self.state, PipelineState::Stopped) {
            PipelineState::Active(mut session) | PipelineState::Starting(mut session) => {
                let report = session.stop();
                if report.is_clean() {
                    log::info!("Session stopped");
                }
                Some(report)
            }
            PipelineState::Stopped => None,
        }
    }

    /// Newest detection result of the running session
    pub fn poll(&self) -> Option<DetectionResult> {
        self.session().and_then(Session::poll)
    }

    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.session().and_then(Session::latest_frame)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
