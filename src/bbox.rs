use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Axis-aligned box in left-top-right-bottom format.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct BBox([f32; 4]);

impl From<BBox> for [f32; 4] {
    fn from(bbox: BBox) -> Self {
        bbox.0
    }
}

impl BBox {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        BBox([left, top, right, bottom])
    }

    /// Builds a box from its center and size.
    #[inline]
    pub fn xywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        BBox([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0])
    }

    /// Tight box around `points`, `None` when there are none.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a na::Point2<f32>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = [first.x, first.y, first.x, first.y];

        let bounds = iter.fold(init, |[l, t, r, b], p| {
            [l.min(p.x), t.min(p.y), r.max(p.x), b.max(p.y)]
        });

        Some(BBox(bounds))
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        (self.0[0] + self.0[2]) / 2.0
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        (self.0[1] + self.0[3]) / 2.0
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let i_left = self.left().max(other.left());
        let i_top = self.top().max(other.top());
        let i_right = self.right().min(other.right());
        let i_bottom = self.bottom().min(other.bottom());
        let i_area = (i_right - i_left).max(0.0) * (i_bottom - i_top).max(0.0);

        let union = self.area() + other.area() - i_area;
        if union <= 0.0 {
            return 0.0;
        }

        i_area / union
    }

    /// Maps a box given in `[0, 1]` units to pixel units.
    #[inline]
    pub fn scaled(&self, sx: f32, sy: f32) -> BBox {
        BBox([self.0[0] * sx, self.0[1] * sy, self.0[2] * sx, self.0[3] * sy])
    }

    pub fn clamp(&self, width: f32, height: f32) -> BBox {
        BBox([
            self.0[0].clamp(0.0, width),
            self.0[1].clamp(0.0, height),
            self.0[2].clamp(0.0, width),
            self.0[3].clamp(0.0, height),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_format_conversion() {
        let bbox = BBox::xywh(10.0, 20.0, 4.0, 6.0);

        assert_eq!(bbox.as_slice(), &[8.0, 17.0, 12.0, 23.0]);
        assert_eq!(bbox.cx(), 10.0);
        assert_eq!(bbox.cy(), 20.0);
        assert_eq!(bbox.width(), 4.0);
        assert_eq!(bbox.height(), 6.0);
    }

    #[test]
    fn iou_of_identical_and_disjoint() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltrb(5.0, 0.0, 15.0, 10.0);
        let c = BBox::ltrb(20.0, 20.0, 30.0, 30.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn bounds_of_points() {
        let pts = [
            na::Point2::new(3.0, 4.0),
            na::Point2::new(-1.0, 8.0),
            na::Point2::new(2.0, 1.0),
        ];

        let bbox = BBox::from_points(pts.iter()).unwrap();
        assert_eq!(bbox.as_slice(), &[-1.0, 1.0, 3.0, 8.0]);
        assert!(BBox::from_points(std::iter::empty()).is_none());
    }
}
