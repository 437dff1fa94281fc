//! Face Filters - webcam overlays fitted to face landmarks
//!
//! Captures camera frames, finds a face with an ONNX landmark model and
//! draws an animal mask, a tree with a face hole, or the landmark mesh over
//! the mirrored video.

pub mod app;
pub mod camera;
pub mod catalog;
pub mod channel;
pub mod detector;
pub mod geometry;
pub mod loader;
pub mod overlay;
pub mod selection;
pub mod session;
pub mod settings;

pub use app::App;
