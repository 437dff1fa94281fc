//! Face mesh landmark model
//!
//! Runs `face_landmark.onnx` (192x192 RGB, NHWC, values in [0, 1]) on a
//! square region of the frame. Without a previous face the region is the
//! whole frame padded to a square; while tracking it is the previous face
//! bounds grown by half. The model returns mesh points in input pixels and
//! a face-presence logit.

use ndarray::Array4;

use super::{DetectorConfig, DetectorError, FaceLandmarks, LandmarkDetector, BASE_LANDMARKS};
use crate::camera::CameraFrame;
use crate::geometry::{Bounds, Landmark};

pub const MODEL_FILE: &str = "face_landmark.onnx";
const INPUT_SIZE: u32 = 192;
/// Region growth around the previous face while tracking
const TRACKING_MARGIN: f32 = 1.5;

/// Square crop of the frame, in pixels. May extend past the frame edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Roi {
    /// Whole frame, centered and padded to a square
    pub fn full_frame(width: u32, height: u32) -> Self {
        let size = width.max(height) as f32;
        Self {
            x: (width as f32 - size) / 2.0,
            y: (height as f32 - size) / 2.0,
            size,
        }
    }

    /// Square around normalized face bounds, grown by `margin`
    pub fn around(bounds: &Bounds, width: u32, height: u32, margin: f32) -> Self {
        let (cx, cy) = bounds.center();
        let (cx, cy) = (cx * width as f32, cy * height as f32);
        let extent = (bounds.width() * width as f32).max(bounds.height() * height as f32);
        let size = (extent * margin).max(1.0);
        Self {
            x: cx - size / 2.0,
            y: cy - size / 2.0,
            size,
        }
    }

    /// Map a point in model input pixels back to normalized frame coordinates
    pub fn to_frame(&self, px: f32, py: f32, width: u32, height: u32) -> Landmark {
        let scale = self.size / INPUT_SIZE as f32;
        Landmark::new(
            (self.x + px * scale) / width as f32,
            (self.y + py * scale) / height as f32,
        )
    }
}

pub struct FaceMeshDetector {
    session: Option<ort::session::Session>,
    config: DetectorConfig,
    /// Face bounds from the last frame, when tracking
    previous: Option<Bounds>,
}

impl FaceMeshDetector {
    /// Load the model from the configured or discovered models directory
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        let model_dir = super::find_model_dir(config.model_dir.as_deref())?;
        let model_path = model_dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path));
        }
        if config.max_faces != 1 {
            log::warn!("max_faces = {} requested; tracking a single face", config.max_faces);
        }

        let session = ort::session::Session::builder()
            .map_err(|e| DetectorError::Load(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| DetectorError::Load(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| DetectorError::Load(format!("Failed to load {:?}: {}", model_path, e)))?;
        log::info!("Loaded face landmark model from {:?}", model_path);

        Ok(Self {
            session: Some(session),
            config,
            previous: None,
        })
    }

    pub fn is_tracking(&self) -> bool {
        self.previous.is_some()
    }

    fn threshold(&self) -> f32 {
        if self.is_tracking() {
            self.config.min_tracking_confidence
        } else {
            self.config.min_detection_confidence
        }
    }

    fn run_model(
        session: &mut ort::session::Session,
        input: Vec<f32>,
    ) -> Result<(Vec<f32>, f32), DetectorError> {
        let side = INPUT_SIZE as usize;
        let input_array = Array4::from_shape_vec((1, side, side, 3), input)
            .map_err(|e| DetectorError::Input(e.to_string()))?;
        let input_tensor = ort::value::Tensor::from_array(input_array)?;

        let outputs = session.run(ort::inputs![input_tensor])?;

        // Mesh output is a flat run of xyz triples; the presence flag is a single logit
        let mut mesh = None;
        let mut flag = None;
        for (_name, value) in outputs.iter() {
            let (_shape, data) = value.try_extract_tensor::<f32>()?;
            if data.len() >= BASE_LANDMARKS * 3 && data.len() % 3 == 0 {
                mesh.get_or_insert_with(|| data.to_vec());
            } else if data.len() == 1 {
                flag.get_or_insert(data[0]);
            }
        }

        match (mesh, flag) {
            (Some(mesh), Some(flag)) => Ok((mesh, flag)),
            (None, _) => Err(DetectorError::Output("no landmark tensor".into())),
            (_, None) => Err(DetectorError::Output("no face flag tensor".into())),
        }
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<FaceLandmarks>, DetectorError> {
        let threshold = self.threshold();
        let roi = match &self.previous {
            Some(bounds) => Roi::around(bounds, frame.width, frame.height, TRACKING_MARGIN),
            None => Roi::full_frame(frame.width, frame.height),
        };
        let session = self.session.as_mut().ok_or(DetectorError::Closed)?;

        let input = crop_nhwc(frame, &roi, INPUT_SIZE);
        let (mesh, flag) = Self::run_model(session, input)?;

        let score = sigmoid(flag);
        if score < threshold {
            self.previous = None;
            return Ok(None);
        }

        let mut points: Vec<Landmark> = mesh
            .chunks_exact(3)
            .map(|xyz| roi.to_frame(xyz[0], xyz[1], frame.width, frame.height))
            .collect();
        if !self.config.refine_landmarks {
            points.truncate(BASE_LANDMARKS);
        }

        self.previous = Bounds::from_landmarks(&points);
        Ok(Some(FaceLandmarks { points, score }))
    }

    fn close(&mut self) -> Result<(), DetectorError> {
        if self.session.take().is_some() {
            log::info!("Face landmark model released");
        }
        self.previous = None;
        Ok(())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Nearest-neighbor crop of `roi` into a `size` x `size` RGB float buffer (HWC).
/// Pixels outside the frame stay black.
fn crop_nhwc(frame: &CameraFrame, roi: &Roi, size: u32) -> Vec<f32> {
    let mut output = vec![0.0f32; (size * size * 3) as usize];
    let step = roi.size / size as f32;

    for y in 0..size {
        let src_y = (roi.y + (y as f32 + 0.5) * step).floor();
        if src_y < 0.0 || src_y >= frame.height as f32 {
            continue;
        }
        for x in 0..size {
            let src_x = (roi.x + (x as f32 + 0.5) * step).floor();
            if src_x < 0.0 || src_x >= frame.width as f32 {
                continue;
            }
            let src_idx = ((src_y as u32 * frame.width + src_x as u32) * 4) as usize;
            if src_idx + 2 < frame.data.len() {
                let out_idx = ((y * size + x) * 3) as usize;
                output[out_idx] = frame.data[src_idx] as f32 / 255.0;
                output[out_idx + 1] = frame.data[src_idx + 1] as f32 / 255.0;
                output[out_idx + 2] = frame.data[src_idx + 2] as f32 / 255.0;
            }
        }
    }

    output
}
