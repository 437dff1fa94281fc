//! Face mesh debug view: a faint tessellation under contour connectors,
//! topped with landmark dots
//!
//! The tessellation is the Delaunay triangulation of the 468 base mesh
//! points as they appear in the frame.

use spade::{DelaunayTriangulation, Point2, Triangulation as _};

use super::canvas::{Canvas, Color, CompositeOp, Paint, Path};
use crate::detector::BASE_LANDMARKS;
use crate::geometry::Landmark;

const CONTOUR: u32 = 0xE0E0E0;
const ACCENT: u32 = 0xFF3030;
/// `#C0C0C070`
const TESSELLATION: Color = Color {
    r: 0xC0 as f32 / 255.0,
    g: 0xC0 as f32 / 255.0,
    b: 0xC0 as f32 / 255.0,
    a: 0x70 as f32 / 255.0,
};
const TESSELLATION_WIDTH: f32 = 1.0;
const CONNECTOR_WIDTH: f32 = 2.0;
const DOT_RADIUS: f32 = 1.0;

#[rustfmt::skip]
pub const FACE_OVAL: &[(usize, usize)] = &[
    (10, 338), (338, 297), (297, 332), (332, 284), (284, 251), (251, 389),
    (389, 356), (356, 454), (454, 323), (323, 361), (361, 288), (288, 397),
    (397, 365), (365, 379), (379, 378), (378, 400), (400, 377), (377, 152),
    (152, 148), (148, 176), (176, 149), (149, 150), (150, 136), (136, 172),
    (172, 58), (58, 132), (132, 93), (93, 234), (234, 127), (127, 162),
    (162, 21), (21, 54), (54, 103), (103, 67), (67, 109), (109, 10),
];

#[rustfmt::skip]
pub const LIPS: &[(usize, usize)] = &[
    (61, 146), (146, 91), (91, 181), (181, 84), (84, 17), (17, 314),
    (314, 405), (405, 321), (321, 375), (375, 291), (61, 185), (185, 40),
    (40, 39), (39, 37), (37, 0), (0, 267), (267, 269), (269, 270),
    (270, 409), (409, 291), (78, 95), (95, 88), (88, 178), (178, 87),
    (87, 14), (14, 317), (317, 402), (402, 318), (318, 324), (324, 308),
    (78, 191), (191, 80), (80, 81), (81, 82), (82, 13), (13, 312),
    (312, 311), (311, 310), (310, 415), (415, 308),
];

#[rustfmt::skip]
pub const LEFT_EYE: &[(usize, usize)] = &[
    (263, 249), (249, 390), (390, 373), (373, 374), (374, 380), (380, 381),
    (381, 382), (382, 362), (263, 466), (466, 388), (388, 387), (387, 386),
    (386, 385), (385, 384), (384, 398), (398, 362),
];

#[rustfmt::skip]
pub const RIGHT_EYE: &[(usize, usize)] = &[
    (33, 7), (7, 163), (163, 144), (144, 145), (145, 153), (153, 154),
    (154, 155), (155, 133), (33, 246), (246, 161), (161, 160), (160, 159),
    (159, 158), (158, 157), (157, 173), (173, 133),
];

/// Draw the mesh view mirrored onto the canvas
pub fn draw(canvas: &mut Canvas, landmarks: &[Landmark]) {
    let (w, h) = (canvas.width(), canvas.height());
    let points: Vec<(f32, f32)> = landmarks
        .iter()
        .map(|p| p.to_mirrored_pixels(w, h))
        .collect();

    let mesh = &points[..points.len().min(BASE_LANDMARKS)];
    let mut web = Path::new();
    for (a, b) in tessellation(mesh) {
        web.move_to(a.0, a.1).line_to(b.0, b.1);
    }
    if !web.is_empty() {
        canvas.stroke(&web, TESSELLATION_WIDTH, &Paint::solid(TESSELLATION), CompositeOp::SourceOver);
    }

    draw_connectors(canvas, &points, FACE_OVAL, Color::hex(CONTOUR));
    draw_connectors(canvas, &points, LEFT_EYE, Color::hex(ACCENT));
    draw_connectors(canvas, &points, RIGHT_EYE, Color::hex(ACCENT));
    draw_connectors(canvas, &points, LIPS, Color::hex(CONTOUR));

    let mut dots = Path::new();
    for &(x, y) in &points {
        dots.circle(x, y, DOT_RADIUS);
    }
    canvas.fill(&dots, &Paint::solid(Color::hex(ACCENT)), CompositeOp::SourceOver);
}

/// Edges of the Delaunay triangulation over `points`; empty when fewer than
/// three distinct points or a coordinate is not finite
pub fn tessellation(points: &[(f32, f32)]) -> Vec<((f32, f32), (f32, f32))> {
    if points.len() < 3 {
        return Vec::new();
    }
    let vertices = points.iter().map(|&(x, y)| Point2::new(x, y)).collect();
    let triangulation: DelaunayTriangulation<Point2<f32>> =
        match DelaunayTriangulation::bulk_load(vertices) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("Skipping mesh tessellation: {:?}", e);
                return Vec::new();
            }
        };
    triangulation
        .undirected_edges()
        .map(|edge| {
            let [a, b] = edge.positions();
            ((a.x, a.y), (b.x, b.y))
        })
        .collect()
}

/// Connectors whose endpoints are missing from a short landmark set are skipped
fn draw_connectors(
    canvas: &mut Canvas,
    points: &[(f32, f32)],
    connections: &[(usize, usize)],
    color: Color,
) {
    let mut path = Path::new();
    for &(a, b) in connections {
        if let (Some(&(x0, y0)), Some(&(x1, y1))) = (points.get(a), points.get(b)) {
            path.move_to(x0, y0).line_to(x1, y1);
        }
    }
    if !path.is_empty() {
        canvas.stroke(&path, CONNECTOR_WIDTH, &Paint::solid(color), CompositeOp::SourceOver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_landmarks(n: usize) -> Vec<Landmark> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Landmark::new(0.5 + 0.2 * a.cos(), 0.5 + 0.25 * a.sin())
            })
            .collect()
    }

    #[test]
    fn test_connector_indices_fit_mesh() {
        for table in [FACE_OVAL, LIPS, LEFT_EYE, RIGHT_EYE] {
            assert!(table.iter().all(|&(a, b)| a < 468 && b < 468));
        }
    }

    #[test]
    fn test_dots_are_mirrored() {
        let mut canvas = Canvas::new(100, 100);
        draw(&mut canvas, &[Landmark::new(0.205, 0.505)]);
        let dot = canvas.pixel(79, 50);
        assert!(dot[3] > 200, "dot alpha was {}", dot[3]);
        assert!(dot[0] > 0xF0 && dot[1] < 0x40);
        assert_eq!(canvas.pixel(20, 50)[3], 0);
    }

    #[test]
    fn test_tessellation_of_square_with_center() {
        let points = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)];
        let edges = tessellation(&points);
        // Four sides plus four spokes to the center
        assert_eq!(edges.len(), 8);
        let spokes = edges
            .iter()
            .filter(|(a, b)| *a == (5.0, 5.0) || *b == (5.0, 5.0))
            .count();
        assert_eq!(spokes, 4);
    }

    #[test]
    fn test_tessellation_needs_three_points() {
        assert!(tessellation(&[(1.0, 1.0), (2.0, 2.0)]).is_empty());
    }

    #[test]
    fn test_tessellation_drawn_in_faint_gray() {
        let mut canvas = Canvas::new(100, 100);
        // Mirrored to (80, 50.5), (20, 50.5) and (50, 90)
        let landmarks = [
            Landmark::new(0.2, 0.505),
            Landmark::new(0.8, 0.505),
            Landmark::new(0.5, 0.9),
        ];
        draw(&mut canvas, &landmarks);

        let edge = canvas.pixel(50, 50);
        assert!((100..=124).contains(&edge[3]), "edge alpha was {}", edge[3]);
        assert!((0xB8..=0xC8).contains(&edge[0]) && edge[0] == edge[2]);
        assert_eq!(canvas.pixel(50, 70)[3], 0, "triangle interior stays clear");
    }

    #[test]
    fn test_mesh_draw_is_repeatable() {
        let landmarks = ring_landmarks(478);
        let mut a = Canvas::new(160, 120);
        let mut b = Canvas::new(160, 120);
        draw(&mut a, &landmarks);
        draw(&mut b, &landmarks);
        assert!(!a.is_transparent());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_short_landmark_set_draws_dots_only() {
        let mut canvas = Canvas::new(50, 50);
        draw(&mut canvas, &ring_landmarks(5));
        assert!(!canvas.is_transparent());
    }
}
