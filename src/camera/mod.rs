//! Camera capture module
//!
//! Captures frames on a background thread. Each frame goes to a
//! latest-frame slot for display and into the newest-wins channel feeding
//! face detection. The camera device is opened and closed on the capture
//! thread itself. `start` returns at once; the outcome of the open arrives
//! through [`CameraCapture::poll_ready`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};

use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::NewestSender;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Failed to open camera {index}: {reason}")]
    Open { index: u32, reason: String },
    #[error("Failed to open camera stream: {0}")]
    Stream(String),
    #[error("Failed to capture frame: {0}")]
    Capture(String),
    #[error("Failed to close camera: {0}")]
    Close(String),
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Capture thread exited before the camera opened")]
    Disconnected,
    #[error("Capture thread panicked")]
    Panicked,
}

/// Capture device settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera index (0 for the default device)
    pub index: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame data
#[derive(Clone)]
pub struct CameraFrame {
    /// RGBA pixel data, unmirrored
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_number: u64,
    pub timestamp: Instant,
}

impl CameraFrame {
    pub fn from_image(image: RgbaImage, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            frame_number,
            timestamp: Instant::now(),
        }
    }

    /// Borrow the pixels as an image, `None` if the buffer size is off
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(list) => list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// A frame source driven by the capture thread
pub trait CameraBackend {
    /// Human-readable device name
    fn name(&self) -> String;

    /// Block until the next frame is available
    fn capture(&mut self) -> Result<RgbaImage, CameraError>;

    /// Stop the stream and release the device
    fn close(&mut self) -> Result<(), CameraError>;
}

/// Opens a backend on the capture thread
pub type BackendOpener = Box<dyn FnOnce() -> Result<Box<dyn CameraBackend>, CameraError> + Send>;

/// Native camera through nokhwa
pub struct NokhwaCamera {
    camera: Camera,
}

impl NokhwaCamera {
    /// Open the device, falling back to looser format requests
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let index = CameraIndex::Index(config.index);
        let attempts = [
            RequestedFormatType::Closest(nokhwa::utils::CameraFormat::new(
                Resolution::new(config.width, config.height),
                nokhwa::utils::FrameFormat::MJPEG,
                30,
            )),
            RequestedFormatType::HighestResolution(Resolution::new(config.width, config.height)),
            RequestedFormatType::None,
        ];

        let mut last_error = String::new();
        let mut opened = None;
        for format in attempts {
            match Camera::new(index.clone(), RequestedFormat::new::<RgbAFormat>(format)) {
                Ok(camera) => {
                    opened = Some(camera);
                    break;
                }
                Err(e) => {
                    log::warn!("Camera format request {:?} failed: {:?}", format, e);
                    last_error = e.to_string();
                }
            }
        }
        let mut camera = opened.ok_or(CameraError::Open {
            index: config.index,
            reason: last_error,
        })?;

        camera
            .open_stream()
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );
        Ok(Self { camera })
    }

    pub fn opener(config: CameraConfig) -> BackendOpener {
        Box::new(move || {
            let camera = NokhwaCamera::open(&config)?;
            Ok(Box::new(camera) as Box<dyn CameraBackend>)
        })
    }
}

impl CameraBackend for NokhwaCamera {
    fn name(&self) -> String {
        self.camera.info().human_name().to_string()
    }

    fn capture(&mut self) -> Result<RgbaImage, CameraError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let decoded = frame
            .decode_image::<RgbAFormat>()
            .map_err(|e| CameraError::Capture(format!("decode: {}", e)))?;
        let (width, height) = (decoded.width(), decoded.height());
        // nokhwa links its own `image` version; move the raw buffer across
        RgbaImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::Capture("decoded buffer size mismatch".into()))
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.camera
            .stop_stream()
            .map_err(|e| CameraError::Close(e.to_string()))
    }
}

/// Running capture thread and its shared frame slot
pub struct CameraCapture {
    latest: Arc<Mutex<Option<Arc<CameraFrame>>>>,
    running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<Result<(), CameraError>>>,
    ready_rx: Receiver<Result<String, CameraError>>,
    /// Set once the device reported open
    name: Option<String>,
}

impl CameraCapture {
    /// Spawn the capture thread, which opens the device. Only a failure to
    /// spawn is reported here.
    pub fn start(
        opener: BackendOpener,
        detection: NewestSender<Arc<CameraFrame>>,
    ) -> Result<Self, CameraError> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let frame_count = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let latest_clone = latest.clone();
        let running_clone = running.clone();
        let frame_count_clone = frame_count.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut backend = match opener() {
                    Ok(backend) => {
                        let _ = ready_tx.send(Ok(backend.name()));
                        backend
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                Self::capture_loop(
                    backend.as_mut(),
                    &latest_clone,
                    &detection,
                    &running_clone,
                    &frame_count_clone,
                );
                let closed = backend.close();
                log::info!("Camera capture thread stopped");
                closed
            })
            .map_err(CameraError::Spawn)?;

        Ok(Self {
            latest,
            running,
            frame_count,
            thread_handle: Some(thread_handle),
            ready_rx,
            name: None,
        })
    }

    /// Outcome of the device open, `None` while it is still in progress.
    /// Keeps answering `Ok` once the device is open.
    pub fn poll_ready(&mut self) -> Option<Result<(), CameraError>> {
        if self.name.is_some() {
            return Some(Ok(()));
        }
        match self.ready_rx.try_recv() {
            Ok(Ok(name)) => {
                log::info!("Camera '{}' opened", name);
                self.name = Some(name);
                Some(Ok(()))
            }
            Ok(Err(e)) => Some(Err(e)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CameraError::Disconnected)),
        }
    }

    fn capture_loop(
        backend: &mut dyn CameraBackend,
        latest: &Mutex<Option<Arc<CameraFrame>>>,
        detection: &NewestSender<Arc<CameraFrame>>,
        running: &AtomicBool,
        frame_count: &AtomicU64,
    ) {
        log::info!("Starting camera capture ({})", backend.name());

        while running.load(Ordering::Acquire) {
            match backend.capture() {
                Ok(image) => {
                    let frame_number = frame_count.fetch_add(1, Ordering::Relaxed);
                    let frame = Arc::new(CameraFrame::from_image(image, frame_number));
                    *latest.lock() = Some(frame.clone());
                    detection.send(frame);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }

    /// Get the latest captured frame
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.latest.lock().clone()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Device name, once open
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Stop capturing and release the device. Safe to call twice.
    ///
    /// A device still being opened is not waited for: the capture thread is
    /// detached and closes the device itself when the open completes.
    pub fn stop(&mut self) -> Result<(), CameraError> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        let opening =
            self.name.is_none() && matches!(self.ready_rx.try_recv(), Err(TryRecvError::Empty));
        if opening && !handle.is_finished() {
            log::info!("Camera still opening, releasing it in the background");
            return Ok(());
        }
        handle.join().map_err(|_| CameraError::Panicked)?
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Camera shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::channel::newest_wins;
    use image::Rgba;
    use std::sync::atomic::AtomicUsize;

    /// Counters shared between a fake camera and the test
    #[derive(Default)]
    pub struct FakeCameraStats {
        pub open: AtomicUsize,
        pub closed: AtomicUsize,
    }

    pub struct FakeCamera {
        stats: Arc<FakeCameraStats>,
        fail_close: bool,
    }

    impl FakeCamera {
        pub fn opener(stats: Arc<FakeCameraStats>, fail_close: bool) -> BackendOpener {
            Self::delayed_opener(stats, fail_close, Duration::ZERO)
        }

        /// Opener that takes `delay` to bring the device up
        pub fn delayed_opener(
            stats: Arc<FakeCameraStats>,
            fail_close: bool,
            delay: Duration,
        ) -> BackendOpener {
            Box::new(move || {
                std::thread::sleep(delay);
                stats.open.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeCamera { stats, fail_close }) as Box<dyn CameraBackend>)
            })
        }
    }

    impl CameraBackend for FakeCamera {
        fn name(&self) -> String {
            "fake".into()
        }

        fn capture(&mut self) -> Result<RgbaImage, CameraError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255])))
        }

        fn close(&mut self) -> Result<(), CameraError> {
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(CameraError::Close("device busy".into()))
            } else {
                Ok(())
            }
        }
    }

    pub fn wait_for<F: FnMut() -> bool>(mut cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_frames_reach_slot_and_channel() {
        let stats = Arc::new(FakeCameraStats::default());
        let (tx, rx) = newest_wins();
        let mut capture = CameraCapture::start(FakeCamera::opener(stats.clone(), false), tx).unwrap();

        assert!(wait_for(|| capture.poll_ready().is_some()));
        assert!(matches!(capture.poll_ready(), Some(Ok(()))));
        assert_eq!(capture.name(), Some("fake"));
        assert!(wait_for(|| capture.latest_frame().is_some()));
        let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(frame.to_image().unwrap().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));

        capture.stop().unwrap();
        assert_eq!(stats.open.load(Ordering::SeqCst), 0);
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let (tx, _rx) = newest_wins();
        let opener: BackendOpener = Box::new(|| {
            Err(CameraError::Open {
                index: 3,
                reason: "permission denied".into(),
            })
        });
        let mut capture = CameraCapture::start(opener, tx).unwrap();
        let mut outcome = None;
        assert!(wait_for(|| {
            outcome = capture.poll_ready();
            outcome.is_some()
        }));
        assert!(matches!(outcome, Some(Err(CameraError::Open { index: 3, .. }))));
        assert!(capture.name().is_none());
        assert!(capture.stop().is_ok());
    }

    #[test]
    fn test_start_returns_while_device_opens() {
        let stats = Arc::new(FakeCameraStats::default());
        let (tx, _rx) = newest_wins();
        let began = Instant::now();
        let opener = FakeCamera::delayed_opener(stats.clone(), false, Duration::from_millis(400));
        let mut capture = CameraCapture::start(opener, tx).unwrap();

        assert!(began.elapsed() < Duration::from_millis(200));
        assert!(capture.poll_ready().is_none());
        assert!(wait_for(|| capture.poll_ready().is_some()));
        assert_eq!(capture.name(), Some("fake"));
        capture.stop().unwrap();
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_during_open_releases_device_later() {
        let stats = Arc::new(FakeCameraStats::default());
        let (tx, _rx) = newest_wins();
        let opener = FakeCamera::delayed_opener(stats.clone(), false, Duration::from_millis(300));
        let mut capture = CameraCapture::start(opener, tx).unwrap();

        let began = Instant::now();
        capture.stop().unwrap();
        assert!(began.elapsed() < Duration::from_millis(150));

        // The late open is followed by a close on the detached thread
        assert!(wait_for(|| stats.closed.load(Ordering::SeqCst) == 1));
        assert_eq!(stats.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_failure_is_returned() {
        let stats = Arc::new(FakeCameraStats::default());
        let (tx, _rx) = newest_wins();
        let mut capture = CameraCapture::start(FakeCamera::opener(stats.clone(), true), tx).unwrap();
        assert!(wait_for(|| capture.poll_ready().is_some()));
        assert!(matches!(capture.stop(), Err(CameraError::Close(_))));
        // Second stop is a no-op
        assert!(capture.stop().is_ok());
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }
}
