//! Face hole
//!
//! Cuts an elliptical opening for the user's face out of whatever has been
//! drawn, then shades the rim so the face looks set into the overlay.

use std::f32::consts::TAU;

use super::canvas::{Canvas, Color, CompositeOp, GradientStop, Paint, Path};
use crate::geometry::FaceBox;

/// Parameters of the cut-out
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceHoleStyle {
    /// Hole size relative to the face box
    pub scale: f32,
    /// Alpha of the inner shadow at its darkest
    pub shadow_alpha: f32,
    /// Draw wood-grain arcs around the rim
    pub wood_grain: bool,
}

impl FaceHoleStyle {
    pub fn procedural_tree(scale: f32) -> Self {
        Self {
            scale,
            shadow_alpha: 0.5,
            wood_grain: true,
        }
    }

    pub fn asset_tree(scale: f32) -> Self {
        Self {
            scale,
            shadow_alpha: 0.4,
            wood_grain: false,
        }
    }
}

const GRAIN_ARCS: usize = 8;
const GRAIN_ARC_SPAN: f32 = 0.1;

pub fn punch(canvas: &mut Canvas, face: &FaceBox, style: &FaceHoleStyle) {
    let (cx, cy) = (face.center_x, face.center_y);
    let hole_w = face.width * style.scale;
    let hole_h = face.height * style.scale;
    let hole_min = hole_w.min(hole_h);

    let mut hole = Path::new();
    hole.full_ellipse(cx, cy, hole_w / 2.0, hole_h / 2.0);
    canvas.fill(&hole, &Paint::solid(Color::BLACK), CompositeOp::DestinationOut);

    // Shadow rim inside the hole: clear up to 0.3 of the smaller side, darkest
    // at 0.55, filled between the hole edge and a reversed inner ellipse
    let shadow = Paint::Radial {
        center: (cx, cy),
        inner_radius: hole_min * 0.3,
        outer_radius: hole_min * 0.55,
        stops: vec![
            GradientStop::new(0.0, Color::TRANSPARENT),
            GradientStop::new(1.0, Color::BLACK.with_alpha(style.shadow_alpha)),
        ],
    };
    let mut ring = Path::new();
    ring.ellipse(cx, cy, hole_w / 2.0, hole_h / 2.0, 0.0, TAU, false).close();
    ring.ellipse(cx, cy, hole_w * 0.35, hole_h * 0.35, 0.0, TAU, true).close();
    canvas.fill(&ring, &shadow, CompositeOp::SourceOver);

    if style.wood_grain {
        let grain = Paint::solid(Color::rgba(101, 67, 33, 0.6));
        let inner = hole_min * 0.35;
        let outer = hole_min * 0.45;
        for i in 0..GRAIN_ARCS {
            let angle = i as f32 / GRAIN_ARCS as f32 * TAU;
            let radius = inner + (outer - inner) * (i % 2) as f32;
            let mut arc = Path::new();
            arc.arc(cx, cy, radius, angle, angle + GRAIN_ARC_SPAN);
            canvas.stroke(&arc, 1.0, &grain, CompositeOp::SourceOver);
        }
    }
}
