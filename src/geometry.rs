//! Face geometry
//!
//! Reduces a set of normalized face landmarks to a pixel-space face box.
//! The video is shown horizontally flipped, so the box handed to the
//! compositor is mirrored on X. Boxes are independent per frame: detector
//! jitter goes straight through to the overlay position.

/// A normalized landmark (0..1 relative to frame width/height)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Pixel position on a horizontally mirrored display
    pub fn to_mirrored_pixels(self, width: u32, height: u32) -> (f32, f32) {
        let w = width as f32;
        (w - self.x * w, self.y * height as f32)
    }
}

/// Axis-aligned bounds of a landmark set, in normalized coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Running min/max over all points. `None` for an empty set.
    pub fn from_landmarks(points: &[Landmark]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };

        for p in &points[1..] {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_y = bounds.max_y.max(p.y);
        }

        Some(bounds)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// Face box in pixel space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for FaceBox {
    fn default() -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

impl FaceBox {
    /// Denormalize bounds by the frame size
    pub fn from_bounds(bounds: &Bounds, frame_width: u32, frame_height: u32) -> Self {
        let (w, h) = (frame_width as f32, frame_height as f32);
        let (cx, cy) = bounds.center();
        Self {
            center_x: cx * w,
            center_y: cy * h,
            width: bounds.width() * w,
            height: bounds.height() * h,
        }
    }

    /// Flip the center horizontally for a mirrored display of the given width
    pub fn mirrored(self, display_width: u32) -> Self {
        Self {
            center_x: display_width as f32 - self.center_x,
            ..self
        }
    }

    /// Larger of width and height, the base for overlay scaling
    pub fn size(&self) -> f32 {
        self.width.max(self.height)
    }
}

/// Face geometry carried from frame to frame
///
/// `face` always holds the last detected box; `detected` says whether the
/// most recent frame actually contained a face.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FaceTrack {
    pub face: FaceBox,
    pub detected: bool,
}

impl FaceTrack {
    /// Apply one frame's detector output. Stores the mirrored box.
    pub fn update(&mut self, landmarks: Option<&[Landmark]>, frame_width: u32, frame_height: u32) {
        match landmarks.and_then(Bounds::from_landmarks) {
            Some(bounds) => {
                self.face =
                    FaceBox::from_bounds(&bounds, frame_width, frame_height).mirrored(frame_width);
                self.detected = true;
            }
            None => self.detected = false,
        }
    }

    /// Forget the current detection but keep the geometry
    pub fn lose(&mut self) {
        self.detected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn square(min_x: f32, max_x: f32, min_y: f32, max_y: f32) -> Vec<Landmark> {
        vec![
            Landmark::new(min_x, min_y),
            Landmark::new(max_x, min_y),
            Landmark::new(0.4, 0.3),
            Landmark::new(max_x, max_y),
            Landmark::new(min_x, max_y),
        ]
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds::from_landmarks(&[]).is_none());
    }

    #[test]
    fn test_bounds_single_point_collapses() {
        let b = Bounds::from_landmarks(&[Landmark::new(0.25, 0.75)]).unwrap();
        assert_eq!(b.width(), 0.0);
        assert_eq!(b.height(), 0.0);
        assert_eq!(b.center(), (0.25, 0.75));
    }

    #[test]
    fn test_bounds_ordered_and_centered() {
        let points: Vec<Landmark> = (0..50)
            .map(|i| {
                let t = i as f32 / 49.0;
                Landmark::new(0.9 - 0.6 * t, 0.1 + 0.5 * (t * 7.0).sin().abs())
            })
            .collect();
        let b = Bounds::from_landmarks(&points).unwrap();
        assert!(b.min_x <= b.max_x);
        assert!(b.min_y <= b.max_y);
        let (cx, cy) = b.center();
        assert!(approx(cx, (b.min_x + b.max_x) / 2.0));
        assert!(approx(cy, (b.min_y + b.max_y) / 2.0));
    }

    #[test]
    fn test_face_box_scenario() {
        let b = Bounds::from_landmarks(&square(0.3, 0.5, 0.2, 0.4)).unwrap();
        let face = FaceBox::from_bounds(&b, 640, 480);
        assert!(approx(face.width, 128.0));
        assert!(approx(face.height, 96.0));
        assert!(approx(face.center_x, 256.0));
        assert!(approx(face.center_y, 144.0));

        let mirrored = face.mirrored(640);
        assert!(approx(mirrored.center_x, 384.0));
        assert!(approx(mirrored.center_y, 144.0));
        assert!(approx(mirrored.size(), 128.0));
    }

    #[test]
    fn test_mirror_is_width_minus_x() {
        let face = FaceBox {
            center_x: 100.0,
            center_y: 50.0,
            width: 10.0,
            height: 10.0,
        };
        assert!(approx(face.mirrored(800).center_x, 700.0));
        assert!(approx(face.mirrored(800).mirrored(800).center_x, 100.0));
    }

    #[test]
    fn test_track_keeps_geometry_on_miss() {
        let mut track = FaceTrack::default();
        assert!(!track.detected);

        let points = square(0.3, 0.5, 0.2, 0.4);
        track.update(Some(&points), 640, 480);
        assert!(track.detected);
        let seen = track.face;

        track.update(None, 640, 480);
        assert!(!track.detected);
        assert_eq!(track.face, seen);

        track.update(Some(&[]), 640, 480);
        assert!(!track.detected);
        assert_eq!(track.face, seen);
    }

    #[test]
    fn test_landmark_mirrored_pixels() {
        let (x, y) = Landmark::new(0.25, 0.5).to_mirrored_pixels(640, 480);
        assert!(approx(x, 480.0));
        assert!(approx(y, 240.0));
    }
}
