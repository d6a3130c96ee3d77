use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;

/// Number of points produced by the face-mesh landmark model.
pub const LANDMARK_COUNT: usize = 468;

/// Landmarks of one face in pixel space.
///
/// Index `i` always refers to the same anatomical point, so the order of
/// `points` is part of the value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct FaceLandmarkSet {
    points: Vec<na::Point2<i32>>,
}

impl FaceLandmarkSet {
    pub fn new(points: Vec<na::Point2<i32>>) -> Self {
        Self { points }
    }

    /// Maps normalized `[0, 1]` coordinates onto a `width x height` frame.
    ///
    /// Coordinates are truncated toward zero; points the model placed outside
    /// the frame stay outside.
    pub fn from_normalized(points: &[na::Point2<f32>], width: u32, height: u32) -> Self {
        let points = points
            .iter()
            .map(|p| {
                na::Point2::new(
                    (p.x * width as f32) as i32,
                    (p.y * height as f32) as i32,
                )
            })
            .collect();

        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&na::Point2<i32>> {
        self.points.get(idx)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &na::Point2<i32>> {
        self.points.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[na::Point2<i32>] {
        &self.points
    }

    /// Pixel bounds of the face, `None` for an empty set.
    pub fn bbox(&self) -> Option<BBox> {
        let pts: Vec<_> = self
            .points
            .iter()
            .map(|p| na::Point2::new(p.x as f32, p.y as f32))
            .collect();

        BBox::from_points(pts.iter())
    }
}

impl std::ops::Index<usize> for FaceLandmarkSet {
    type Output = na::Point2<i32>;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}
