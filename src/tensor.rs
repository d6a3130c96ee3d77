//! Image-to-tensor conversions shared by the ONNX backends.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation};
use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::roi::Roi;

/// Memory layout a graph expects for its image input.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// Graphs converted from TFLite keep channels last.
    #[default]
    Nhwc,
    Nchw,
}

/// Bilinearly samples `roi` into a `size x size` image. Pixels the region
/// takes from outside the frame are black.
pub fn crop(rgb: &RgbImage, roi: &Roi, size: u32) -> RgbImage {
    let mut out = RgbImage::new(size, size);

    if let Some(projection) = roi.projection(size) {
        warp_into(
            rgb,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );
    }

    out
}

/// Resizes `rgb` to fit a black `size x size` canvas, centered.
///
/// Also returns the region of the frame, in frame pixels, that the canvas
/// covers.
pub fn letterbox(rgb: &RgbImage, size: u32) -> (RgbImage, BBox) {
    let (w, h) = rgb.dimensions();
    let scale = size as f32 / w.max(h).max(1) as f32;
    let nw = ((w as f32 * scale).round() as u32).clamp(1, size);
    let nh = ((h as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(rgb, nw, nh, FilterType::Triangle);
    let (ox, oy) = ((size - nw) / 2, (size - nh) / 2);

    let mut canvas = RgbImage::new(size, size);
    imageops::overlay(&mut canvas, &resized, ox as i64, oy as i64);

    let sx = w as f32 / nw as f32;
    let sy = h as f32 / nh as f32;
    let covered = BBox::ltrb(
        -(ox as f32) * sx,
        -(oy as f32) * sy,
        (size - ox) as f32 * sx,
        (size - oy) as f32 * sy,
    );

    (canvas, covered)
}

/// Packs an image into a batch of one, mapping every value through `f`
/// (per channel).
pub fn to_batch<F>(image: &RgbImage, layout: TensorLayout, f: F) -> Array4<f32>
where
    F: Fn(f32, usize) -> f32,
{
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let value = |x: usize, y: usize, c: usize| {
        let px = image.get_pixel(x as u32, y as u32);
        f(px.0[c] as f32, c)
    };

    match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| value(x, y, c)),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| value(x, y, c)),
    }
}
