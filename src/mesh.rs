//! Face-mesh connectivity and rendering onto a [`Frame`].

use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, Canvas};
use nalgebra as na;
use spade::{DelaunayTriangulation, HasPosition, Triangulation};

use crate::config::{Connections, MeshStyle, MAX_CIRCLE_RADIUS, MAX_THICKNESS};
use crate::frame::Frame;
use crate::landmarks::FaceLandmarkSet;

const FACE_OVAL: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10,
];

const LIPS: &[&[usize]] = &[
    &[61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291],
    &[61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291],
    &[78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308],
    &[78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308],
];

const LEFT_EYE: &[&[usize]] = &[
    &[263, 249, 390, 373, 374, 380, 381, 382, 362],
    &[263, 466, 388, 387, 386, 385, 384, 398, 362],
];

const RIGHT_EYE: &[&[usize]] = &[
    &[33, 7, 163, 144, 145, 153, 154, 155, 133],
    &[33, 246, 161, 160, 159, 158, 157, 173, 133],
];

const LEFT_EYEBROW: &[&[usize]] = &[&[276, 283, 282, 295, 285], &[300, 293, 334, 296, 336]];

const RIGHT_EYEBROW: &[&[usize]] = &[&[46, 53, 52, 65, 55], &[70, 63, 105, 66, 107]];

/// Landmark index pairs joined by a stroke when a face is drawn.
pub fn contour_connections() -> impl Iterator<Item = (usize, usize)> {
    std::iter::once(FACE_OVAL)
        .chain(LIPS.iter().copied())
        .chain(LEFT_EYE.iter().copied())
        .chain(RIGHT_EYE.iter().copied())
        .chain(LEFT_EYEBROW.iter().copied())
        .chain(RIGHT_EYEBROW.iter().copied())
        .flat_map(|path| path.windows(2).map(|w| (w[0], w[1])))
}

struct Vertex {
    index: usize,
    position: spade::Point2<f64>,
}

impl HasPosition for Vertex {
    type Scalar = f64;

    #[inline]
    fn position(&self) -> spade::Point2<f64> {
        self.position
    }
}

/// Delaunay edges between the landmarks of one face.
///
/// Landmarks sharing a pixel collapse into one vertex, the last index wins.
pub fn tessellation(face: &FaceLandmarkSet) -> Vec<(usize, usize)> {
    let mut mesh = DelaunayTriangulation::<Vertex>::default();

    for (index, p) in face.iter().enumerate() {
        let position = spade::Point2::new(p.x as f64, p.y as f64);
        if let Err(err) = mesh.insert(Vertex { index, position }) {
            log::trace!("landmark {} left out of the mesh: {:?}", index, err);
        }
    }

    mesh.undirected_edges()
        .map(|edge| {
            let [a, b] = edge.vertices();
            (a.data().index, b.data().index)
        })
        .collect()
}

fn connections(face: &FaceLandmarkSet, which: Connections) -> Vec<(usize, usize)> {
    match which {
        Connections::Tessellation => tessellation(face),
        Connections::Contours => contour_connections().collect(),
    }
}

/// Renders the mesh edges and landmark dots of every face in place.
///
/// Connections referring to indices the set does not have are skipped, and
/// strokes are clipped to the frame.
pub fn draw_landmarks(frame: &mut Frame, faces: &[FaceLandmarkSet], style: &MeshStyle) {
    let color = frame.native_color(style.color);
    let mut canvas = match frame.canvas() {
        Some(canvas) => canvas,
        None => return,
    };

    for face in faces {
        for (a, b) in connections(face, style.connections) {
            if let (Some(pa), Some(pb)) = (face.get(a), face.get(b)) {
                draw_segment(&mut canvas, *pa, *pb, style.thickness, color);
            }
        }

        for p in face.iter() {
            draw_dot(&mut canvas, *p, style.circle_radius, color);
        }
    }
}

/// Strokes `from -> to`, `thickness` pixels wide, after clipping it to the canvas.
pub fn draw_segment<C: Canvas>(
    canvas: &mut C,
    from: na::Point2<i32>,
    to: na::Point2<i32>,
    thickness: u32,
    color: C::Pixel,
) {
    let (width, height) = canvas.dimensions();
    let (x0, y0) = (from.x as f64, from.y as f64);
    let (x1, y1) = (to.x as f64, to.y as f64);

    // wide strokes are parallel copies offset across the major axis
    let steep = (y1 - y0).abs() > (x1 - x0).abs();
    let half = thickness.clamp(1, MAX_THICKNESS).saturating_sub(1) as i32 / 2;

    for k in -half..=half {
        let (ox, oy) = if steep { (k as f64, 0.0) } else { (0.0, k as f64) };

        if let Some((a, b)) = clip_segment((x0 + ox, y0 + oy), (x1 + ox, y1 + oy), width, height) {
            draw_line_segment_mut(canvas, a, b, color);
        }
    }
}

/// Filled disk; a zero radius paints a single pixel.
pub fn draw_dot<C: Canvas>(canvas: &mut C, center: na::Point2<i32>, radius: u32, color: C::Pixel) {
    let (width, height) = canvas.dimensions();
    let r = radius.min(MAX_CIRCLE_RADIUS) as i64;
    let (x, y) = (center.x as i64, center.y as i64);

    if x < -r || y < -r || x >= width as i64 + r || y >= height as i64 + r {
        return;
    }

    draw_filled_circle_mut(canvas, (center.x, center.y), r as i32, color);
}

/// Liang-Barsky clip of `a -> b` to the pixel grid `[0, w - 1] x [0, h - 1]`,
/// `None` when nothing of the segment is visible.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    width: u32,
    height: u32,
) -> Option<((f32, f32), (f32, f32))> {
    if width == 0 || height == 0 {
        return None;
    }

    let (xmax, ymax) = ((width - 1) as f64, (height - 1) as f64);
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);

    for (p, q) in [(-dx, a.0), (dx, xmax - a.0), (-dy, a.1), (dy, ymax - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }

    let at = |t: f64| {
        (
            (a.0 + t * dx).round().clamp(0.0, xmax) as f32,
            (a.1 + t * dy).round().clamp(0.0, ymax) as f32,
        )
    };

    Some((at(t0), at(t1)))
}
