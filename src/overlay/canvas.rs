//! Overlay canvas
//!
//! A thin drawing layer over a `tiny_skia::Pixmap`. Paths are built as
//! `kurbo::BezPath`s (lines, quadratic curves, elliptical arcs) and handed to
//! tiny-skia for anti-aliased filling and stroking with a solid color or a
//! gradient, composited source-over or destination-out.
//!
//! The pixmap stores premultiplied RGBA. `pixel` and `to_image` demultiply.

use std::f64::consts::TAU;

use image::{Rgba, RgbaImage};
use kurbo::{Arc, BezPath, Ellipse, PathEl, Point, Shape as _, Vec2};
use tiny_skia::{
    BlendMode, ColorU8, FillRule, LineCap, LineJoin, LinearGradient, Pixmap, PixmapPaint,
    RadialGradient, Shader, SpreadMode, Stroke, Transform,
};

/// Flattening tolerance for arcs, in pixels
const TOLERANCE: f64 = 0.1;

/// Straight-alpha color with components in 0..1
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    pub fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a.clamp(0.0, 1.0),
        }
    }

    /// Opaque color from `0xRRGGBB`
    pub fn hex(rgb: u32) -> Self {
        Self::rgba((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a: a.clamp(0.0, 1.0), ..self }
    }

    fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
        .unwrap_or(tiny_skia::Color::TRANSPARENT)
    }
}

/// A color at a position (0..1) along a gradient
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

/// How a shape is colored
#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// Gradient along the line from `start` to `end`, padded past both ends
    Linear {
        start: (f32, f32),
        end: (f32, f32),
        stops: Vec<GradientStop>,
    },
    /// Gradient between two concentric circles, padded inside and outside
    Radial {
        center: (f32, f32),
        inner_radius: f32,
        outer_radius: f32,
        stops: Vec<GradientStop>,
    },
}

impl Paint {
    pub fn solid(color: Color) -> Self {
        Paint::Solid(color)
    }

    fn shader(&self) -> Option<Shader<'static>> {
        match self {
            Paint::Solid(color) => Some(Shader::SolidColor(color.to_skia())),
            Paint::Linear { start, end, stops } => {
                let first = stops.first()?.color;
                let stops = stops
                    .iter()
                    .map(|s| tiny_skia::GradientStop::new(s.offset, s.color.to_skia()))
                    .collect();
                LinearGradient::new(
                    tiny_skia::Point::from_xy(start.0, start.1),
                    tiny_skia::Point::from_xy(end.0, end.1),
                    stops,
                    SpreadMode::Pad,
                    Transform::identity(),
                )
                .or(Some(Shader::SolidColor(first.to_skia())))
            }
            Paint::Radial {
                center,
                inner_radius,
                outer_radius,
                stops,
            } => {
                let last = stops.last()?.color;
                let inner = inner_radius.max(0.0);
                if *outer_radius <= inner {
                    return Some(Shader::SolidColor(last.to_skia()));
                }
                // tiny-skia radials start at radius zero: rescale the stops
                // onto 0..outer and pad the inner disc with the first color.
                let span = outer_radius - inner;
                let mut skia_stops = Vec::with_capacity(stops.len() + 1);
                if inner > 0.0 {
                    skia_stops.push(tiny_skia::GradientStop::new(0.0, stops[0].color.to_skia()));
                }
                skia_stops.extend(stops.iter().map(|s| {
                    let offset = (inner + s.offset.clamp(0.0, 1.0) * span) / outer_radius;
                    tiny_skia::GradientStop::new(offset, s.color.to_skia())
                }));
                let c = tiny_skia::Point::from_xy(center.0, center.1);
                RadialGradient::new(
                    c,
                    c,
                    *outer_radius,
                    skia_stops,
                    SpreadMode::Pad,
                    Transform::identity(),
                )
                .or(Some(Shader::SolidColor(last.to_skia())))
            }
        }
    }
}

/// How drawn pixels combine with what is already on the canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Draw over existing content
    #[default]
    SourceOver,
    /// Erase existing content where the shape is drawn
    DestinationOut,
}

impl CompositeOp {
    fn blend_mode(self) -> BlendMode {
        match self {
            CompositeOp::SourceOver => BlendMode::SourceOver,
            CompositeOp::DestinationOut => BlendMode::DestinationOut,
        }
    }
}

/// A path built from drawing commands, in canvas pixel coordinates
#[derive(Clone, Debug, Default)]
pub struct Path {
    inner: BezPath,
    /// A subpath is open and new segments join it
    open: bool,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, x: f32, y: f32) -> &mut Self {
        self.inner.move_to(point(x, y));
        self.open = true;
        self
    }

    pub fn line_to(&mut self, x: f32, y: f32) -> &mut Self {
        if !self.open {
            return self.move_to(x, y);
        }
        self.inner.line_to(point(x, y));
        self
    }

    /// Quadratic Bezier from the current point through control `(cx, cy)`
    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) -> &mut Self {
        if !self.open {
            return self.move_to(x, y);
        }
        self.inner.quad_to(point(cx, cy), point(x, y));
        self
    }

    /// Axis-aligned elliptical arc. Joins the current subpath with a line if
    /// one is open, like a 2-D canvas context does. A sweep of a full turn or
    /// more in either direction draws the whole ellipse in that direction.
    pub fn ellipse(
        &mut self,
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
        start: f32,
        end: f32,
        anticlockwise: bool,
    ) -> &mut Self {
        let (start, end) = (start as f64, end as f64);
        let arc = Arc {
            center: point(cx, cy),
            radii: Vec2::new(rx.abs() as f64, ry.abs() as f64),
            start_angle: start,
            sweep_angle: arc_sweep(start, end, anticlockwise),
            x_rotation: 0.0,
        };
        let first = arc.center + Vec2::new(arc.radii.x * start.cos(), arc.radii.y * start.sin());
        if self.open {
            self.inner.line_to(first);
        } else {
            self.inner.move_to(first);
            self.open = true;
        }
        self.inner.extend(arc.append_iter(TOLERANCE));
        self
    }

    /// Closed clockwise ellipse as its own subpath
    pub fn full_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32) -> &mut Self {
        let ellipse = Ellipse::new(point(cx, cy), (rx.abs() as f64, ry.abs() as f64), 0.0);
        self.inner.extend(ellipse.path_elements(TOLERANCE));
        self.open = false;
        self
    }

    pub fn arc(&mut self, cx: f32, cy: f32, r: f32, start: f32, end: f32) -> &mut Self {
        self.ellipse(cx, cy, r, r, start, end, false)
    }

    pub fn circle(&mut self, cx: f32, cy: f32, r: f32) -> &mut Self {
        self.full_ellipse(cx, cy, r, r)
    }

    pub fn close(&mut self) -> &mut Self {
        if self.open {
            self.inner.close_path();
            self.open = false;
        }
        self
    }

    /// True when no segment has been drawn
    pub fn is_empty(&self) -> bool {
        self.inner
            .elements()
            .iter()
            .all(|el| matches!(el, PathEl::MoveTo(_) | PathEl::ClosePath))
    }

    fn to_skia(&self) -> Option<tiny_skia::Path> {
        let mut builder = tiny_skia::PathBuilder::new();
        for el in self.inner.elements() {
            match *el {
                PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
                PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
                PathEl::QuadTo(c, p) => {
                    builder.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32)
                }
                PathEl::CurveTo(c1, c2, p) => builder.cubic_to(
                    c1.x as f32,
                    c1.y as f32,
                    c2.x as f32,
                    c2.y as f32,
                    p.x as f32,
                    p.y as f32,
                ),
                PathEl::ClosePath => builder.close(),
            }
        }
        builder.finish()
    }
}

fn point(x: f32, y: f32) -> Point {
    Point::new(x as f64, y as f64)
}

/// Signed sweep from `start` to `end`, clamped to one turn
fn arc_sweep(start: f64, end: f64, anticlockwise: bool) -> f64 {
    let delta = end - start;
    if delta.abs() >= TAU {
        return if anticlockwise { -TAU } else { TAU };
    }
    if anticlockwise {
        -(-delta).rem_euclid(TAU)
    } else {
        delta.rem_euclid(TAU)
    }
}

/// Premultiplied copy of a straight-alpha bitmap, ready to blit
pub fn pixmap_from_image(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
    }
    Some(pixmap)
}

/// RGBA drawing surface, transparent when cleared. Zero-sized until resized.
#[derive(Default)]
pub struct Canvas {
    pixmap: Option<Pixmap>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixmap: Pixmap::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, |p| p.width())
    }

    pub fn height(&self) -> u32 {
        self.pixmap.as_ref().map_or(0, |p| p.height())
    }

    /// Premultiplied RGBA bytes, row-major
    pub fn data(&self) -> &[u8] {
        self.pixmap.as_ref().map_or(&[], |p| p.data())
    }

    /// Straight-alpha pixel; transparent outside the canvas
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        self.pixmap
            .as_ref()
            .and_then(|p| p.pixel(x, y))
            .map(|c| {
                let c = c.demultiply();
                Rgba([c.red(), c.green(), c.blue(), c.alpha()])
            })
            .unwrap_or(Rgba([0, 0, 0, 0]))
    }

    /// Straight-alpha copy of the whole canvas
    pub fn to_image(&self) -> RgbaImage {
        let mut image = RgbaImage::new(self.width(), self.height());
        if let Some(pixmap) = &self.pixmap {
            for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
                let c = src.demultiply();
                *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
            }
        }
        image
    }

    /// Match the canvas to the frame size. Any resize also clears.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width() != width || self.height() != height {
            self.pixmap = Pixmap::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        if let Some(pixmap) = &mut self.pixmap {
            pixmap.fill(tiny_skia::Color::TRANSPARENT);
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.pixmap
            .as_ref()
            .map_or(true, |p| p.pixels().iter().all(|c| c.alpha() == 0))
    }

    /// Blit a bitmap with its top-left corner at `(x, y)`, blending source-over
    pub fn draw_image(&mut self, bitmap: &Pixmap, x: i32, y: i32) {
        if let Some(pixmap) = &mut self.pixmap {
            pixmap.draw_pixmap(
                x,
                y,
                bitmap.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
    }

    /// Fill with the non-zero winding rule
    pub fn fill(&mut self, path: &Path, paint: &Paint, op: CompositeOp) {
        let (Some(pixmap), Some(path), Some(paint)) =
            (&mut self.pixmap, path.to_skia(), skia_paint(paint, op))
        else {
            return;
        };
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    /// Stroke with butt caps and miter joins
    pub fn stroke(&mut self, path: &Path, width: f32, paint: &Paint, op: CompositeOp) {
        let (Some(pixmap), Some(path), Some(paint)) =
            (&mut self.pixmap, path.to_skia(), skia_paint(paint, op))
        else {
            return;
        };
        let stroke = Stroke {
            width,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }
}

fn skia_paint(paint: &Paint, op: CompositeOp) -> Option<tiny_skia::Paint<'static>> {
    Some(tiny_skia::Paint {
        shader: paint.shader()?,
        blend_mode: op.blend_mode(),
        anti_alias: true,
        ..tiny_skia::Paint::default()
    })
}
