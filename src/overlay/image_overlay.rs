//! Image overlay: a catalog bitmap scaled to the face and centered on it

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tiny_skia::Pixmap;

use super::canvas::{self, Canvas};
use crate::geometry::FaceBox;

/// A decoded overlay bitmap with its last scaled copy
pub struct OverlayImage {
    asset_id: String,
    source: RgbaImage,
    scaled: Option<Pixmap>,
}

impl OverlayImage {
    pub fn new(asset_id: impl Into<String>, source: RgbaImage) -> Self {
        Self {
            asset_id: asset_id.into(),
            source,
            scaled: None,
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// Size the bitmap takes when its larger side equals `extent`
    pub fn fitted_size(&self, extent: f32) -> (u32, u32) {
        let (w, h) = self.source.dimensions();
        let longest = w.max(h) as f32;
        if longest <= 0.0 {
            return (0, 0);
        }
        let ratio = extent / longest;
        (
            (w as f32 * ratio).round().max(0.0) as u32,
            (h as f32 * ratio).round().max(0.0) as u32,
        )
    }

    /// Premultiplied scaled copy for the target size, reused while the size
    /// is unchanged
    fn scaled(&mut self, width: u32, height: u32) -> Option<&Pixmap> {
        let stale = self
            .scaled
            .as_ref()
            .map_or(true, |s| (s.width(), s.height()) != (width, height));
        if stale {
            let resized = imageops::resize(&self.source, width, height, FilterType::Triangle);
            self.scaled = canvas::pixmap_from_image(&resized);
        }
        self.scaled.as_ref()
    }
}

/// Draw `image` centered on the face, its larger side `face.size() * scale`
pub fn draw(canvas: &mut Canvas, face: &FaceBox, image: &mut OverlayImage, scale: f32) {
    let (width, height) = image.fitted_size(face.size() * scale);
    if width == 0 || height == 0 {
        return;
    }

    let x = (face.center_x - width as f32 / 2.0).round() as i32;
    let y = (face.center_y - height as f32 / 2.0).round() as i32;
    if let Some(scaled) = image.scaled(width, height) {
        canvas.draw_image(scaled, x, y);
    }
}
