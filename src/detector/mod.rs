//! Face landmark detection
//!
//! The detector is a black box behind [`LandmarkDetector`]: one frame in,
//! zero or one set of normalized landmarks out. [`FaceMeshDetector`] runs a
//! face-mesh ONNX model through ONNX Runtime; [`DetectionWorker`] drives a
//! detector on its own thread.

pub mod face_mesh;
pub mod worker;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::CameraFrame;
use crate::geometry::Landmark;

pub use face_mesh::FaceMeshDetector;
pub use worker::{DetectionResult, DetectionWorker, DetectorOpener};

/// Landmarks in the base face mesh, without iris refinement
pub const BASE_LANDMARKS: usize = 468;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Models directory not found. Create a 'models' directory with ONNX models.")]
    ModelDirNotFound,
    #[error("Face landmark model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("{0}")]
    Load(String),
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Bad model input: {0}")]
    Input(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Detector is closed")]
    Closed,
    #[error("Failed to spawn detection thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Detection thread panicked")]
    Panicked,
}

/// Detector options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Only one face is tracked; larger values are clamped
    pub max_faces: usize,
    /// Keep the iris points beyond the base mesh
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Directory holding `face_landmark.onnx`; searched for when unset
    pub model_dir: Option<PathBuf>,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_dir: None,
            intra_threads: 2,
        }
    }
}

/// One detected face
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<Landmark>,
    /// Face presence probability
    pub score: f32,
}

/// Per-frame face landmark detector
pub trait LandmarkDetector: Send {
    /// Landmarks of the face in `frame`, or `None` when there is no face
    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<FaceLandmarks>, DetectorError>;

    /// Release the model. Further `detect` calls fail.
    fn close(&mut self) -> Result<(), DetectorError>;
}

/// Find the models directory
///
/// A configured directory wins. Otherwise `models/` is looked up next to the
/// executable, two and three levels above it, and in the working directory.
pub fn find_model_dir(configured: Option<&Path>) -> Result<PathBuf, DetectorError> {
    if let Some(dir) = configured {
        return if dir.exists() {
            Ok(dir.to_path_buf())
        } else {
            Err(DetectorError::ModelNotFound(dir.to_path_buf()))
        };
    }

    if let Ok(exe_path) = std::env::current_exe() {
        let found = exe_path
            .ancestors()
            .skip(1)
            .take(3)
            .map(|dir| dir.join("models"))
            .find(|dir| dir.exists());
        if let Some(dir) = found {
            return Ok(dir);
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let dir = cwd.join("models");
        if dir.exists() {
            return Ok(dir);
        }
    }

    Err(DetectorError::ModelDirNotFound)
}
