//! Overlay module
//!
//! Draws the face overlay layer: a transparent RGBA canvas the size of the
//! video frame, fully redrawn for every detection result and shown above
//! the mirrored video.

pub mod canvas;
pub mod face_hole;
pub mod image_overlay;
pub mod mesh;
pub mod procedural_tree;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::geometry::{FaceTrack, Landmark};
use crate::selection::FilterFamily;

pub use canvas::Canvas;
pub use face_hole::FaceHoleStyle;
pub use image_overlay::OverlayImage;

/// Drawing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawStrategy {
    /// Landmark dots and contour lines
    MeshDebug,
    /// Animal mask bitmap, no masking
    AnimalImage,
    /// Tree bitmap with a face hole
    TreeImage,
    /// Tree drawn from shapes, with a face hole
    ProceduralTree,
}

impl Default for DrawStrategy {
    fn default() -> Self {
        Self::ProceduralTree
    }
}

/// Overlay sizing, relative to the larger side of the face box
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub animal_scale: f32,
    pub tree_image_scale: f32,
    pub procedural_tree_scale: f32,
    /// Face hole size relative to the face box
    pub hole_scale: f32,
    /// Fixed seed for the tree texture dots; random when unset
    pub texture_seed: Option<u64>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            animal_scale: 3.3,
            tree_image_scale: 3.0,
            procedural_tree_scale: 2.8,
            hole_scale: 1.1,
            texture_seed: None,
        }
    }
}

/// Owns the overlay canvas and the loaded bitmaps, one slot per family
pub struct Compositor {
    config: OverlayConfig,
    canvas: Canvas,
    tree_image: Option<OverlayImage>,
    animal_image: Option<OverlayImage>,
    rng: StdRng,
}

impl Compositor {
    pub fn new(config: OverlayConfig) -> Self {
        let rng = match config.texture_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            config,
            canvas: Canvas::new(0, 0),
            tree_image: None,
            animal_image: None,
            rng,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Install a freshly loaded bitmap, replacing the family's previous one
    pub fn set_image(&mut self, family: FilterFamily, image: OverlayImage) {
        log::debug!("Overlay image for {:?} is now '{}'", family, image.asset_id());
        *self.slot_mut(family) = Some(image);
    }

    pub fn image(&self, family: FilterFamily) -> Option<&OverlayImage> {
        match family {
            FilterFamily::Tree => self.tree_image.as_ref(),
            FilterFamily::Animal => self.animal_image.as_ref(),
        }
    }

    fn slot_mut(&mut self, family: FilterFamily) -> &mut Option<OverlayImage> {
        match family {
            FilterFamily::Tree => &mut self.tree_image,
            FilterFamily::Animal => &mut self.animal_image,
        }
    }

    /// Redraw the overlay for one frame
    ///
    /// The canvas is matched to the frame and cleared; nothing is drawn unless
    /// the track says a face was detected in this frame.
    pub fn render(
        &mut self,
        track: &FaceTrack,
        landmarks: Option<&[Landmark]>,
        strategy: DrawStrategy,
        width: u32,
        height: u32,
    ) -> &Canvas {
        self.canvas.resize(width, height);
        self.canvas.clear();

        if !track.detected {
            return &self.canvas;
        }
        let face = track.face;

        match strategy {
            DrawStrategy::MeshDebug => {
                if let Some(points) = landmarks {
                    mesh::draw(&mut self.canvas, points);
                }
            }
            DrawStrategy::AnimalImage => {
                if let Some(image) = self.animal_image.as_mut() {
                    image_overlay::draw(&mut self.canvas, &face, image, self.config.animal_scale);
                }
            }
            DrawStrategy::TreeImage => {
                if let Some(image) = self.tree_image.as_mut() {
                    image_overlay::draw(
                        &mut self.canvas,
                        &face,
                        image,
                        self.config.tree_image_scale,
                    );
                    face_hole::punch(
                        &mut self.canvas,
                        &face,
                        &FaceHoleStyle::asset_tree(self.config.hole_scale),
                    );
                }
            }
            DrawStrategy::ProceduralTree => {
                if let Some(seed) = self.config.texture_seed {
                    self.rng = StdRng::seed_from_u64(seed);
                }
                procedural_tree::draw(
                    &mut self.canvas,
                    &face,
                    self.config.procedural_tree_scale,
                    self.config.hole_scale,
                    &mut self.rng,
                );
            }
        }

        &self.canvas
    }
}
