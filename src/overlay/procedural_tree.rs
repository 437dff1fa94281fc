//! Procedural tree
//!
//! A trunk-and-crown tree drawn around the face, sized from the face box,
//! with the face hole cut through the trunk.

use std::f32::consts::TAU;

use rand::Rng;

use super::canvas::{Canvas, Color, CompositeOp, GradientStop, Paint, Path};
use super::face_hole::{self, FaceHoleStyle};
use crate::geometry::FaceBox;

const TRUNK_WIDTH: f32 = 0.28;
const TRUNK_HEIGHT: f32 = 0.65;
const CROWN_RADIUS: f32 = 0.5;
/// Fraction of the trunk above the face center
const TRUNK_RISE: f32 = 0.3;

const BARK: u32 = 0x3E2723;
const BARK_WIDTH: f32 = 1.5;
const KNOT: u32 = 0x4E342E;
const KNOT_HIGHLIGHT: u32 = 0x8D6E63;
const BRANCH: u32 = 0x5D4037;
const BRANCH_WIDTH: f32 = 2.0;
const TEXTURE_DOTS: usize = 30;

const TRUNK_STOPS: [(f32, u32); 6] = [
    (0.0, 0x5D4037),
    (0.2, 0x6D4C41),
    (0.4, 0x8D6E63),
    (0.6, 0xA1887F),
    (0.8, 0x6D4C41),
    (1.0, 0x5D4037),
];

/// Knot positions as fractions of the trunk box
const KNOTS: [(f32, f32); 4] = [(0.3, 0.25), (0.7, 0.45), (0.2, 0.65), (0.8, 0.8)];

/// (color, radius, offset x, offset y) relative to the crown radius
const LEAF_LAYERS: [(u32, f32, f32, f32); 9] = [
    (0x1B5E20, 1.0, 0.0, 0.0),
    (0x2E7D32, 0.9, -0.3, -0.1),
    (0x388E3C, 0.9, 0.3, -0.1),
    (0x43A047, 0.8, 0.0, -0.3),
    (0x4CAF50, 0.75, -0.25, -0.25),
    (0x66BB6A, 0.75, 0.25, -0.25),
    (0x81C784, 0.7, 0.0, -0.4),
    (0xA5D6A7, 0.6, -0.15, -0.35),
    (0xC8E6C9, 0.6, 0.15, -0.35),
];

/// (x, y, size, color) relative to the crown radius
const LEAF_CLUSTERS: [(f32, f32, f32, u32); 9] = [
    (-0.6, -0.2, 0.15, 0x4CAF50),
    (0.6, -0.2, 0.15, 0x4CAF50),
    (-0.4, 0.3, 0.12, 0x66BB6A),
    (0.4, 0.3, 0.12, 0x66BB6A),
    (0.0, -0.6, 0.18, 0x81C784),
    (-0.3, -0.5, 0.1, 0xA5D6A7),
    (0.3, -0.5, 0.1, 0xA5D6A7),
    (-0.5, 0.1, 0.08, 0xC8E6C9),
    (0.5, 0.1, 0.08, 0xC8E6C9),
];

/// (angle, length relative to the crown radius)
const BRANCHES: [(f32, f32); 4] = [(-0.3, 0.3), (0.3, 0.25), (-0.1, 0.2), (0.1, 0.2)];

/// Tree dimensions derived from a face box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeLayout {
    pub center_x: f32,
    pub trunk_x: f32,
    pub trunk_y: f32,
    pub trunk_width: f32,
    pub trunk_height: f32,
    pub crown_y: f32,
    pub crown_radius: f32,
}

impl TreeLayout {
    pub fn new(face: &FaceBox, tree_scale: f32) -> Self {
        let scale = face.size() * tree_scale;
        let trunk_width = scale * TRUNK_WIDTH;
        let trunk_height = scale * TRUNK_HEIGHT;
        let crown_radius = scale * CROWN_RADIUS;
        let trunk_y = face.center_y - trunk_height * TRUNK_RISE;
        Self {
            center_x: face.center_x,
            trunk_x: face.center_x - trunk_width / 2.0,
            trunk_y,
            trunk_width,
            trunk_height,
            crown_y: trunk_y - crown_radius * 0.25,
            crown_radius,
        }
    }
}

/// Draw the whole tree, then cut the face hole
pub fn draw<R: Rng>(
    canvas: &mut Canvas,
    face: &FaceBox,
    tree_scale: f32,
    hole_scale: f32,
    rng: &mut R,
) {
    let layout = TreeLayout::new(face, tree_scale);

    draw_trunk(canvas, &layout);
    draw_bark(canvas, &layout);
    draw_knots(canvas, &layout);
    draw_crown(canvas, &layout);
    draw_branches(canvas, &layout);
    draw_texture(canvas, &layout, rng);

    face_hole::punch(canvas, face, &FaceHoleStyle::procedural_tree(hole_scale));
}

fn draw_trunk(canvas: &mut Canvas, t: &TreeLayout) {
    let (x, y, w, h) = (t.trunk_x, t.trunk_y, t.trunk_width, t.trunk_height);
    let paint = Paint::Linear {
        start: (x, 0.0),
        end: (x + w, 0.0),
        stops: TRUNK_STOPS
            .iter()
            .map(|&(offset, rgb)| GradientStop::new(offset, Color::hex(rgb)))
            .collect(),
    };

    let mut trunk = Path::new();
    trunk
        .move_to(x + w * 0.15, y)
        .quad_to(x + w * 0.5, y + h * 0.1, x + w * 0.85, y)
        .quad_to(x + w * 0.95, y + h * 0.5, x + w, y + h)
        .line_to(x, y + h)
        .quad_to(x + w * 0.05, y + h * 0.5, x + w * 0.15, y)
        .close();
    canvas.fill(&trunk, &paint, CompositeOp::SourceOver);
}

fn draw_bark(canvas: &mut Canvas, t: &TreeLayout) {
    let paint = Paint::solid(Color::hex(BARK));
    let (x, y, w, h) = (t.trunk_x, t.trunk_y, t.trunk_width, t.trunk_height);

    for i in 0..8 {
        let line_x = x + w / 8.0 * (i + 1) as f32;
        let v = (i as f32 * 0.5).sin() * 3.0;
        let mut line = Path::new();
        line.move_to(line_x + v, y + 10.0)
            .quad_to(line_x + v * 2.0, y + h * 0.3, line_x - v, y + h * 0.6)
            .quad_to(line_x + v, y + h * 0.8, line_x - v * 0.5, y + h - 5.0);
        canvas.stroke(&line, BARK_WIDTH, &paint, CompositeOp::SourceOver);
    }

    for i in 1..12 {
        let line_y = y + h / 12.0 * i as f32;
        let line_w = w * (0.9 - i as f32 * 0.015);
        let line_x = t.center_x - line_w / 2.0;
        let curve = (i as f32 * 0.3).sin() * 2.0;
        let mut line = Path::new();
        line.move_to(line_x, line_y)
            .quad_to(t.center_x, line_y + curve, line_x + line_w, line_y);
        canvas.stroke(&line, BARK_WIDTH, &paint, CompositeOp::SourceOver);
    }
}

fn draw_knots(canvas: &mut Canvas, t: &TreeLayout) {
    let knot = Paint::solid(Color::hex(KNOT));
    let highlight = Paint::solid(Color::hex(KNOT_HIGHLIGHT));

    for (fx, fy) in KNOTS {
        let kx = t.trunk_x + t.trunk_width * fx;
        let ky = t.trunk_y + t.trunk_height * fy;

        let mut body = Path::new();
        body.full_ellipse(kx, ky, 4.0, 6.0);
        canvas.fill(&body, &knot, CompositeOp::SourceOver);

        let mut shine = Path::new();
        shine.full_ellipse(kx - 1.0, ky - 1.0, 2.0, 3.0);
        canvas.fill(&shine, &highlight, CompositeOp::SourceOver);
    }
}

fn draw_crown(canvas: &mut Canvas, t: &TreeLayout) {
    let r = t.crown_radius;

    let mut shadow = Path::new();
    shadow.circle(t.center_x + 3.0, t.crown_y + 3.0, r * 1.1);
    canvas.fill(
        &shadow,
        &Paint::solid(Color::rgba(0, 50, 0, 0.3)),
        CompositeOp::SourceOver,
    );

    for (rgb, radius, ox, oy) in LEAF_LAYERS {
        let mut layer = Path::new();
        layer.circle(t.center_x + r * ox, t.crown_y + r * oy, r * radius);
        canvas.fill(&layer, &Paint::solid(Color::hex(rgb)), CompositeOp::SourceOver);
    }

    for (ox, oy, size, rgb) in LEAF_CLUSTERS {
        let mut cluster = Path::new();
        cluster.circle(t.center_x + r * ox, t.crown_y + r * oy, r * size);
        canvas.fill(&cluster, &Paint::solid(Color::hex(rgb)), CompositeOp::SourceOver);
    }
}

fn draw_branches(canvas: &mut Canvas, t: &TreeLayout) {
    let paint = Paint::solid(Color::hex(BRANCH));
    for (angle, length) in BRANCHES {
        let start_x = t.center_x + angle.sin() * t.trunk_width * 0.4;
        let start_y = t.trunk_y + 10.0;
        let end_x = start_x + angle.sin() * t.crown_radius * length;
        let end_y = start_y - angle.cos() * t.crown_radius * length;

        let mut branch = Path::new();
        branch.move_to(start_x, start_y).line_to(end_x, end_y);
        canvas.stroke(&branch, BRANCH_WIDTH, &paint, CompositeOp::SourceOver);
    }
}

fn draw_texture<R: Rng>(canvas: &mut Canvas, t: &TreeLayout, rng: &mut R) {
    let paint = Paint::solid(Color::rgba(255, 255, 255, 0.1));
    for i in 0..TEXTURE_DOTS {
        let angle = i as f32 / TEXTURE_DOTS as f32 * TAU;
        let distance = rng.random_range(0.0..1.0f32) * t.crown_radius * 0.8;
        let mut dot = Path::new();
        dot.circle(
            t.center_x + angle.cos() * distance,
            t.crown_y + angle.sin() * distance * 0.6,
            1.0,
        );
        canvas.fill(&dot, &paint, CompositeOp::SourceOver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn face() -> FaceBox {
        FaceBox {
            center_x: 160.0,
            center_y: 140.0,
            width: 40.0,
            height: 50.0,
        }
    }

    #[test]
    fn test_layout_from_face() {
        let layout = TreeLayout::new(&face(), 2.8);
        // scale = 50 * 2.8 = 140
        assert!((layout.trunk_width - 39.2).abs() < 1e-3);
        assert!((layout.trunk_height - 91.0).abs() < 1e-3);
        assert!((layout.crown_radius - 70.0).abs() < 1e-3);
        assert!((layout.trunk_y - (140.0 - 27.3)).abs() < 1e-3);
        assert!((layout.crown_y - (layout.trunk_y - 17.5)).abs() < 1e-3);
        assert!((layout.trunk_x + layout.trunk_width / 2.0 - 160.0).abs() < 1e-3);
    }

    #[test]
    fn test_tree_has_hole_at_face_center() {
        let mut canvas = Canvas::new(320, 320);
        let mut rng = StdRng::seed_from_u64(7);
        draw(&mut canvas, &face(), 2.8, 1.1, &mut rng);

        assert_eq!(canvas.pixel(160, 140)[3], 0, "face shows through");
        // Crown center is well above the face hole
        let crown = canvas.pixel(160, 60);
        assert_eq!(crown[3], 255);
        assert!(crown[1] > crown[0], "crown is green");
        // Far corner untouched
        assert_eq!(canvas.pixel(2, 318)[3], 0);
    }

    #[test]
    fn test_seeded_tree_is_repeatable() {
        let mut a = Canvas::new(320, 320);
        let mut b = Canvas::new(320, 320);
        draw(&mut a, &face(), 2.8, 1.1, &mut StdRng::seed_from_u64(42));
        draw(&mut b, &face(), 2.8, 1.1, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.data(), b.data());
    }
}
