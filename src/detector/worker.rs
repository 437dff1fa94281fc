//! Detection worker thread
//!
//! Loads the detector on its own thread, then takes frames from the
//! newest-wins channel and sends one result per processed frame. Stops when
//! told to or when the frame channel disconnects, and closes the detector on
//! the way out.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{DetectorError, LandmarkDetector};
use crate::camera::CameraFrame;
use crate::geometry::Landmark;

/// Detector output for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
    /// `None` when no face was found
    pub landmarks: Option<Vec<Landmark>>,
}

/// Builds the detector on the worker thread
pub type DetectorOpener =
    Box<dyn FnOnce() -> Result<Box<dyn LandmarkDetector>, DetectorError> + Send>;

pub struct DetectionWorker {
    /// Dropped to stop the thread
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<Result<(), DetectorError>>>,
    ready_rx: Receiver<Result<(), DetectorError>>,
    loaded: bool,
}

impl DetectionWorker {
    /// Spawn the worker, which loads the detector first. Only a failure to
    /// spawn is reported here; the load outcome comes from `poll_ready`.
    pub fn start(
        opener: DetectorOpener,
        frames: Receiver<Arc<CameraFrame>>,
        results: Sender<DetectionResult>,
    ) -> Result<Self, DetectorError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread_handle = std::thread::Builder::new()
            .name("face-detection".to_string())
            .spawn(move || {
                log::info!("Face detection thread started");
                let mut detector = match opener() {
                    Ok(detector) => {
                        let _ = ready_tx.send(Ok(()));
                        detector
                    }
                    Err(e) => {
                        log::error!("Failed to load face detector: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                loop {
                    crossbeam_channel::select! {
                        recv(frames) -> msg => match msg {
                            Ok(frame) => Self::process(detector.as_mut(), &frame, &results),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                let closed = detector.close();
                log::info!("Face detection thread stopped");
                closed
            })
            .map_err(DetectorError::Spawn)?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread_handle: Some(thread_handle),
            ready_rx,
            loaded: false,
        })
    }

    /// Outcome of the detector load, `None` while it is still loading.
    /// Keeps answering `Ok` once loaded.
    pub fn poll_ready(&mut self) -> Option<Result<(), DetectorError>> {
        if self.loaded {
            return Some(Ok(()));
        }
        match self.ready_rx.try_recv() {
            Ok(Ok(())) => {
                self.loaded = true;
                Some(Ok(()))
            }
            Ok(Err(e)) => Some(Err(e)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DetectorError::Closed)),
        }
    }

    fn process(
        detector: &mut dyn LandmarkDetector,
        frame: &CameraFrame,
        results: &Sender<DetectionResult>,
    ) {
        match detector.detect(frame) {
            Ok(face) => {
                let _ = results.send(DetectionResult {
                    frame_number: frame.frame_number,
                    width: frame.width,
                    height: frame.height,
                    landmarks: face.map(|f| f.points),
                });
            }
            Err(e) => {
                log::warn!("Face detection failed on frame {}: {}", frame.frame_number, e);
            }
        }
    }

    /// Stop the thread and close the detector. Safe to call twice.
    ///
    /// A detector still loading is not waited for; the detached thread
    /// closes it once the load finishes.
    pub fn stop(&mut self) -> Result<(), DetectorError> {
        self.stop_tx = None;
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        let loading = !self.loaded && matches!(self.ready_rx.try_recv(), Err(TryRecvError::Empty));
        if loading && !handle.is_finished() {
            log::info!("Face detector still loading, releasing it in the background");
            return Ok(());
        }
        handle.join().map_err(|_| DetectorError::Panicked)?
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Detector shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera::tests::wait_for;
    use crate::channel::newest_wins;
    use crate::detector::FaceLandmarks;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    pub struct FakeDetectorStats {
        pub open: AtomicUsize,
        pub closed: AtomicUsize,
    }

    /// Finds a face on even frames, fails on every fifth
    pub struct FakeDetector {
        stats: Arc<FakeDetectorStats>,
        fail_close: bool,
    }

    impl FakeDetector {
        pub fn new(stats: Arc<FakeDetectorStats>, fail_close: bool) -> Self {
            stats.open.fetch_add(1, Ordering::SeqCst);
            Self { stats, fail_close }
        }

        /// Opener that takes `delay` to load
        pub fn opener(
            stats: Arc<FakeDetectorStats>,
            fail_close: bool,
            delay: Duration,
        ) -> DetectorOpener {
            Box::new(move || {
                std::thread::sleep(delay);
                Ok(Box::new(FakeDetector::new(stats, fail_close)) as Box<dyn LandmarkDetector>)
            })
        }
    }

    impl LandmarkDetector for FakeDetector {
        fn detect(&mut self, frame: &CameraFrame) -> Result<Option<FaceLandmarks>, DetectorError> {
            if frame.frame_number % 5 == 4 {
                return Err(DetectorError::Output("flaky".into()));
            }
            if frame.frame_number % 2 == 1 {
                return Ok(None);
            }
            Ok(Some(FaceLandmarks {
                points: vec![Landmark::new(0.3, 0.2), Landmark::new(0.5, 0.4)],
                score: 0.9,
            }))
        }

        fn close(&mut self) -> Result<(), DetectorError> {
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(DetectorError::Output("close failed".into()))
            } else {
                Ok(())
            }
        }
    }

    fn frame(n: u64) -> Arc<CameraFrame> {
        let image = RgbaImage::from_pixel(4, 3, Rgba([0, 0, 0, 255]));
        Arc::new(CameraFrame::from_image(image, n))
    }

    fn loaded_worker(
        stats: Arc<FakeDetectorStats>,
        fail_close: bool,
        frames: Receiver<Arc<CameraFrame>>,
        results: Sender<DetectionResult>,
    ) -> DetectionWorker {
        let opener = FakeDetector::opener(stats, fail_close, Duration::ZERO);
        let mut worker = DetectionWorker::start(opener, frames, results).unwrap();
        assert!(wait_for(|| worker.poll_ready().is_some()));
        worker
    }

    #[test]
    fn test_results_follow_frames() {
        let stats = Arc::new(FakeDetectorStats::default());
        let (frame_tx, frame_rx) = newest_wins();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let mut worker = loaded_worker(stats.clone(), false, frame_rx, result_tx);
        assert!(matches!(worker.poll_ready(), Some(Ok(()))));

        frame_tx.send(frame(0));
        let hit = result_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(hit.frame_number, 0);
        assert_eq!((hit.width, hit.height), (4, 3));
        assert_eq!(hit.landmarks.map(|l| l.len()), Some(2));

        frame_tx.send(frame(1));
        let miss = result_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(miss.frame_number, 1);
        assert!(miss.landmarks.is_none());

        worker.stop().unwrap();
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detector_error_drops_frame() {
        let stats = Arc::new(FakeDetectorStats::default());
        let (frame_tx, frame_rx) = newest_wins();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let _worker = loaded_worker(stats, false, frame_rx, result_tx);

        frame_tx.send(frame(4));
        assert!(result_rx.recv_timeout(Duration::from_millis(200)).is_err());

        frame_tx.send(frame(6));
        let next = result_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(next.frame_number, 6);
    }

    #[test]
    fn test_frame_channel_disconnect_closes_detector() {
        let stats = Arc::new(FakeDetectorStats::default());
        let (frame_tx, frame_rx) = newest_wins::<Arc<CameraFrame>>();
        let (result_tx, _result_rx) = crossbeam_channel::unbounded();
        let mut worker = loaded_worker(stats.clone(), false, frame_rx, result_tx);

        drop(frame_tx);
        worker.stop().unwrap();
        assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_failure_is_returned() {
        let stats = Arc::new(FakeDetectorStats::default());
        let (_frame_tx, frame_rx) = newest_wins::<Arc<CameraFrame>>();
        let (result_tx, _result_rx) = crossbeam_channel::unbounded();
        let mut worker = loaded_worker(stats, true, frame_rx, result_tx);

        assert!(worker.stop().is_err());
        assert!(worker.stop().is_ok());
    }

    #[test]
    fn test_load_failure_is_reported() {
        let (_frame_tx, frame_rx) = newest_wins::<Arc<CameraFrame>>();
        let (result_tx, _result_rx) = crossbeam_channel::unbounded();
        let opener: DetectorOpener = Box::new(|| Err(DetectorError::Load("missing model".into())));
        let mut worker = DetectionWorker::start(opener, frame_rx, result_tx).unwrap();

        let mut outcome = None;
        assert!(wait_for(|| {
            outcome = worker.poll_ready();
            outcome.is_some()
        }));
        assert!(matches!(outcome, Some(Err(DetectorError::Load(_)))));
        assert!(worker.stop().is_ok());
    }

    #[test]
    fn test_start_and_stop_do_not_wait_for_load() {
        let stats = Arc::new(FakeDetectorStats::default());
        let (_frame_tx, frame_rx) = newest_wins::<Arc<CameraFrame>>();
        let (result_tx, _result_rx) = crossbeam_channel::unbounded();
        let opener = FakeDetector::opener(stats.clone(), false, Duration::from_millis(300));

        let began = Instant::now();
        let mut worker = DetectionWorker::start(opener, frame_rx, result_tx).unwrap();
        assert!(worker.poll_ready().is_none());
        worker.stop().unwrap();
        assert!(began.elapsed() < Duration::from_millis(150));

        // The detached thread closes the detector once it has loaded
        assert!(wait_for(|| stats.closed.load(Ordering::SeqCst) == 1));
        assert_eq!(stats.open.load(Ordering::SeqCst), 0);
    }
}
