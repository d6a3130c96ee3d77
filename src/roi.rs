use imageproc::geometric_transformations::Projection;
use nalgebra as na;

use crate::bbox::BBox;

/// Square crop of a frame, rotated by `angle` radians about its center.
///
/// All values are in frame pixels. The crop's x axis runs along
/// `(cos angle, sin angle)` in the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub cx: f32,
    pub cy: f32,
    pub size: f32,
    pub angle: f32,
}

impl Roi {
    #[inline]
    pub fn new(cx: f32, cy: f32, size: f32, angle: f32) -> Self {
        Self {
            cx,
            cy,
            size,
            angle,
        }
    }

    /// Upright square sharing `bbox`'s center, with side `max(w, h)`.
    pub fn around(bbox: &BBox) -> Self {
        Self::new(bbox.cx(), bbox.cy(), bbox.width().max(bbox.height()), 0.0)
    }

    /// Smallest square, rotated by `angle`, holding every point.
    pub fn enclosing<'a, I>(points: I, angle: f32) -> Option<Self>
    where
        I: IntoIterator<Item = &'a na::Point2<f32>>,
    {
        let rot = na::Rotation2::new(-angle);
        let upright: Vec<_> = points.into_iter().map(|p| rot * *p).collect();
        let bounds = BBox::from_points(upright.iter())?;

        let center = rot.inverse() * na::Point2::new(bounds.cx(), bounds.cy());
        let roi = Self::new(
            center.x,
            center.y,
            bounds.width().max(bounds.height()),
            angle,
        );

        Some(roi).filter(Roi::is_valid)
    }

    #[inline]
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            size: self.size * scale,
            ..*self
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.cx, self.cy, self.size, self.angle]
            .iter()
            .all(|v| v.is_finite())
            && self.size > 0.0
    }

    /// Frame point for crop coordinates `(u, v)` in `[0, 1]`.
    pub fn to_frame(&self, u: f32, v: f32) -> na::Point2<f32> {
        let offset = na::Vector2::new((u - 0.5) * self.size, (v - 0.5) * self.size);

        na::Point2::new(self.cx, self.cy) + na::Rotation2::new(self.angle) * offset
    }

    /// Axis-aligned box covering the rotated square.
    pub fn bounds(&self) -> BBox {
        let (sin, cos) = self.angle.sin_cos();
        let side = self.size * (sin.abs() + cos.abs());

        BBox::xywh(self.cx, self.cy, side, side)
    }

    /// Maps frame pixel indices to pixel indices of an `out x out` crop.
    pub fn projection(&self, out: u32) -> Option<Projection> {
        if !self.is_valid() {
            return None;
        }

        let scale = out as f32 / self.size;
        let half = out as f32 / 2.0 - 0.5;

        Some(
            Projection::translate(0.5 - self.cx, 0.5 - self.cy)
                .and_then(Projection::rotate(-self.angle))
                .and_then(Projection::scale(scale, scale))
                .and_then(Projection::translate(half, half)),
        )
    }
}
