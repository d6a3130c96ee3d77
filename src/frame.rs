use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::prelude::*;

use crate::bbox::BBox;
use crate::error::Error;

/// Order of the three channels stored in a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    /// Camera and video sources deliver blue-green-red.
    Bgr,
    Rgb,
}

/// A single `height x width x 3` image owned by one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Array3<u8>,
    order: ColorOrder,
}

impl Frame {
    pub fn new(pixels: Array3<u8>, order: ColorOrder) -> Result<Self, Error> {
        let (height, width, channels) = pixels.dim();
        if channels != 3 {
            return Err(Error::InvalidFrame(format!(
                "expected 3 channels, got {}",
                channels
            )));
        }

        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }

        Ok(Self {
            pixels: pixels.as_standard_layout().into_owned(),
            order,
        })
    }

    /// Uniformly filled frame, mostly useful for synthetic sources.
    pub fn filled(width: u32, height: u32, order: ColorOrder, value: [u8; 3]) -> Self {
        let pixels = Array3::from_shape_fn((height as usize, width as usize, 3), |(_, _, c)| {
            value[c]
        });

        Self { pixels, order }
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            image.get_pixel(x as u32, y as u32).0[c]
        });

        Self {
            pixels,
            order: ColorOrder::Rgb,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    /// (width, height)
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    #[inline]
    pub fn order(&self) -> ColorOrder {
        self.order
    }

    #[inline]
    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    /// Copy of this frame with channels in RGB order.
    pub fn to_rgb(&self) -> Frame {
        match self.order {
            ColorOrder::Rgb => self.clone(),
            ColorOrder::Bgr => {
                let mut pixels = self.pixels.clone();
                pixels.invert_axis(Axis(2));

                Frame {
                    pixels: pixels.as_standard_layout().into_owned(),
                    order: ColorOrder::Rgb,
                }
            }
        }
    }

    /// `color` (given in RGB) in this frame's channel order.
    #[inline]
    pub fn native_color(&self, color: [u8; 3]) -> Rgb<u8> {
        match self.order {
            ColorOrder::Rgb => Rgb(color),
            ColorOrder::Bgr => Rgb([color[2], color[1], color[0]]),
        }
    }

    /// Drawing surface over the pixel buffer. Channels keep the frame's order,
    /// so colors go through [`Frame::native_color`] first.
    pub fn canvas(&mut self) -> Option<ImageBuffer<Rgb<u8>, &mut [u8]>> {
        let (width, height) = self.dims();

        ImageBuffer::from_raw(width, height, self.pixels.as_slice_mut()?)
    }

    /// Crops `bbox` (clamped to the frame) into an RGB image.
    pub fn crop_rgb(&self, bbox: &BBox) -> Option<RgbImage> {
        let (fw, fh) = self.dims();
        let clamped = bbox.clamp(fw as f32, fh as f32);
        let (left, top) = (clamped.left() as u32, clamped.top() as u32);
        let (right, bottom) = (clamped.right().ceil() as u32, clamped.bottom().ceil() as u32);

        if right <= left || bottom <= top {
            return None;
        }

        let (r, b) = match self.order {
            ColorOrder::Rgb => (0, 2),
            ColorOrder::Bgr => (2, 0),
        };

        Some(RgbImage::from_fn(right - left, bottom - top, |x, y| {
            let px = self
                .pixels
                .slice(s![(top + y) as usize, (left + x) as usize, ..]);
            image::Rgb([px[r], px[1], px[b]])
        }))
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let (fw, fh) = self.dims();
        let full = BBox::ltrb(0.0, 0.0, fw as f32, fh as f32);

        // the full-frame crop is never empty for a valid frame
        self.crop_rgb(&full)
            .unwrap_or_else(|| RgbImage::new(fw, fh))
    }
}
