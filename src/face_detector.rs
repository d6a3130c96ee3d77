use std::path::Path;

use image::RgbImage;
use ndarray::prelude::*;
use ort::session::Session;

use crate::bbox::BBox;
use crate::detection::{Detection, NUM_KEYPOINTS};
use crate::device::{self, Device};
use crate::error::Error;
use crate::tensor::{self, TensorLayout};

pub const INPUT_SIZE: usize = 128;
pub const NUM_ANCHORS: usize = 896;

const NUM_COORDS: usize = 4 + 2 * NUM_KEYPOINTS;
const ANCHOR_STRIDES: [usize; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;
const SCORE_CLIP: f32 = 100.0;

pub struct FaceDetectorConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub layout: TensorLayout,
}

impl FaceDetectorConfig {
    pub fn new(confidence_threshold: f32, layout: TensorLayout) -> Self {
        Self {
            confidence_threshold,
            iou_threshold: 0.3,
            layout,
        }
    }
}

/// Short-range BlazeFace detector.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<(f32, f32)>,
    config: FaceDetectorConfig,
}

impl FaceDetector {
    pub fn new(
        model_src: &Path,
        config: FaceDetectorConfig,
        device: Device,
    ) -> Result<Self, Error> {
        let session = device::load_session(model_src, device)?;
        let mut detector = Self {
            session,
            anchors: generate_anchors(),
            config,
        };

        // a zero frame exercises the output shapes once at startup
        let probe = Array4::zeros(detector.input_shape());
        detector
            .infer(probe.view())
            .map_err(|err| Error::IncompatibleModel {
                path: model_src.to_path_buf(),
                reason: err.to_string(),
            })?;

        Ok(detector)
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.config.confidence_threshold = threshold;
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        match self.config.layout {
            TensorLayout::Nhwc => (1, INPUT_SIZE, INPUT_SIZE, 3),
            TensorLayout::Nchw => (1, 3, INPUT_SIZE, INPUT_SIZE),
        }
    }

    /// Detections in `[0, 1]` frame units, most confident first.
    pub fn detect(&mut self, rgb: &RgbImage) -> Result<Vec<Detection>, Error> {
        let (fw, fh) = rgb.dimensions();
        let (canvas, letterbox) = tensor::letterbox(rgb, INPUT_SIZE as u32);

        let input = tensor::to_batch(&canvas, self.config.layout, |v, _| v / 127.5 - 1.0);

        let (boxes, scores) = self.infer(input.view())?;
        let dets = decode(
            &boxes,
            &scores,
            &self.anchors,
            self.config.confidence_threshold,
        );

        let dets = non_maximum_supression(dets, self.config.iou_threshold);

        Ok(dets
            .into_iter()
            .map(|det| to_frame_units(det, &letterbox, fw as f32, fh as f32))
            .collect())
    }

    fn infer(&mut self, input: ArrayView4<'_, f32>) -> Result<(Vec<f32>, Vec<f32>), Error> {
        let outputs = device::run_session(&mut self.session, input)?;

        let mut boxes = None;
        let mut scores = None;
        for out in outputs {
            match out.len() {
                n if n == NUM_ANCHORS * NUM_COORDS => boxes = Some(out),
                n if n == NUM_ANCHORS => scores = Some(out),
                _ => (),
            }
        }

        match (boxes, scores) {
            (Some(boxes), Some(scores)) => Ok((boxes, scores)),
            _ => Err(Error::InvalidModelOutput(format!(
                "expected {}x{} regressors and {} scores",
                NUM_ANCHORS, NUM_COORDS, NUM_ANCHORS
            ))),
        }
    }
}

/// Anchor centers in `[0, 1]` input units; layers sharing a stride share a grid.
pub fn generate_anchors() -> Vec<(f32, f32)> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;

    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let grid = INPUT_SIZE.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = (
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                );
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }

    anchors
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-SCORE_CLIP, SCORE_CLIP)).exp())
}

fn decode(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[(f32, f32)],
    confidence_threshold: f32,
) -> Vec<Detection> {
    let scale = INPUT_SIZE as f32;
    let mut dets = Vec::new();

    for (idx, &(ax, ay)) in anchors.iter().enumerate() {
        let confidence = sigmoid(scores[idx]);
        if confidence < confidence_threshold {
            continue;
        }

        let raw = &boxes[idx * NUM_COORDS..(idx + 1) * NUM_COORDS];
        let mut keypoints = [(0.0, 0.0); NUM_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = (
                raw[4 + 2 * k] / scale + ax,
                raw[5 + 2 * k] / scale + ay,
            );
        }

        dets.push(Detection {
            x: raw[0] / scale + ax,
            y: raw[1] / scale + ay,
            w: raw[2] / scale,
            h: raw[3] / scale,
            confidence,
            keypoints,
        });
    }

    dets
}

pub fn non_maximum_supression(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut retain: Vec<_> = (0..dets.len() as i32).collect();
    for idx in 0..dets.len() {
        if retain[idx] != -1 {
            for r in retain[idx + 1..].iter_mut() {
                if *r != -1 {
                    let iou = dets[idx].iou(&dets[*r as usize]);
                    if iou > iou_threshold {
                        *r = -1;
                    }
                }
            }
        }
    }

    dets.into_iter()
        .zip(retain)
        .filter_map(|(det, r)| if r > -1 { Some(det) } else { None })
        .collect()
}

/// Maps a detection from letterboxed input units back to `[0, 1]` frame units.
fn to_frame_units(det: Detection, letterbox: &BBox, fw: f32, fh: f32) -> Detection {
    let map_x = |x: f32| (letterbox.left() + x * letterbox.width()) / fw;
    let map_y = |y: f32| (letterbox.top() + y * letterbox.height()) / fh;

    let mut keypoints = det.keypoints;
    for kp in keypoints.iter_mut() {
        *kp = (map_x(kp.0), map_y(kp.1));
    }

    Detection {
        x: map_x(det.x),
        y: map_y(det.y),
        w: det.w * letterbox.width() / fw,
        h: det.h * letterbox.height() / fh,
        confidence: det.confidence,
        keypoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, size: f32, confidence: f32) -> Detection {
        Detection {
            x,
            y,
            w: size,
            h: size,
            confidence,
            keypoints: [(x, y); NUM_KEYPOINTS],
        }
    }

    #[test]
    fn anchor_grid() {
        let anchors = generate_anchors();

        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert_eq!(anchors[0], (0.5 / 16.0, 0.5 / 16.0));
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2], (1.5 / 16.0, 0.5 / 16.0));
        assert_eq!(anchors[512], (0.5 / 8.0, 0.5 / 8.0));
        assert_eq!(anchors[517], anchors[512]);
        assert_eq!(anchors[518], (1.5 / 8.0, 0.5 / 8.0));
        assert_eq!(anchors[NUM_ANCHORS - 1], (7.5 / 8.0, 7.5 / 8.0));
    }

    #[test]
    fn decode_applies_anchor_offsets() {
        let anchors = generate_anchors();
        let mut boxes = vec![0.0; NUM_ANCHORS * NUM_COORDS];
        let mut scores = vec![-10.0; NUM_ANCHORS];

        let idx = 600;
        scores[idx] = 5.0;
        boxes[idx * NUM_COORDS] = 12.8;
        boxes[idx * NUM_COORDS + 1] = -6.4;
        boxes[idx * NUM_COORDS + 2] = 32.0;
        boxes[idx * NUM_COORDS + 3] = 64.0;
        boxes[idx * NUM_COORDS + 4] = 1.28;

        let dets = decode(&boxes, &scores, &anchors, 0.5);
        assert_eq!(dets.len(), 1);

        let (ax, ay) = anchors[idx];
        let d = &dets[0];
        assert!((d.x - (ax + 0.1)).abs() < 1e-6);
        assert!((d.y - (ay - 0.05)).abs() < 1e-6);
        assert!((d.w - 0.25).abs() < 1e-6);
        assert!((d.h - 0.5).abs() < 1e-6);
        assert!((d.keypoints[0].0 - (ax + 0.01)).abs() < 1e-6);
        assert!(d.confidence > 0.99);
    }

    #[test]
    fn sigmoid_is_clipped() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert_eq!(sigmoid(1e9), sigmoid(SCORE_CLIP));
        assert!(sigmoid(-1e9) >= 0.0);
    }

    #[test]
    fn nms_keeps_best_of_overlapping() {
        let dets = vec![
            det(0.5, 0.5, 0.2, 0.7),
            det(0.51, 0.5, 0.2, 0.9),
            det(0.1, 0.1, 0.1, 0.6),
        ];

        let kept = non_maximum_supression(dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.6);
    }

    #[test]
    fn nms_of_nothing() {
        assert!(non_maximum_supression(vec![], 0.3).is_empty());
    }

    #[test]
    fn letterbox_maps_back_to_frame() {
        // 200x100 frame: input covers a 200x200 square starting at y = -50
        let (_, lb) = tensor::letterbox(&RgbImage::new(200, 100), INPUT_SIZE as u32);
        assert!((lb.top() + 50.0).abs() < 1e-4);
        assert!((lb.width() - 200.0).abs() < 1e-4);

        let d = to_frame_units(det(0.5, 0.5, 0.25, 1.0), &lb, 200.0, 100.0);
        assert!((d.x - 0.5).abs() < 1e-6);
        assert!((d.y - 0.5).abs() < 1e-6);
        assert!((d.w - 0.25).abs() < 1e-6);
        assert!((d.h - 0.5).abs() < 1e-6);

        let top = to_frame_units(det(0.5, 0.25, 0.1, 1.0), &lb, 200.0, 100.0);
        assert!(top.y.abs() < 1e-6);
    }
}
