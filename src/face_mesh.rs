use std::path::Path;

use image::RgbImage;
use nalgebra as na;
use ort::session::Session;

use crate::config::{DetectorConfig, ModelPaths};
use crate::detection::Detection;
use crate::detector::LandmarkModel;
use crate::device::{self, Device};
use crate::error::Error;
use crate::face_detector::{FaceDetector, FaceDetectorConfig};
use crate::frame::Frame;
use crate::landmarks::LANDMARK_COUNT;
use crate::roi::Roi;
use crate::tensor::{self, TensorLayout};

pub const INPUT_SIZE: usize = 192;

/// Face box to landmark crop enlargement.
const ROI_SCALE: f32 = 1.5;
/// New detections overlapping a tracked face by more than this are the same face.
const TRACKED_IOU: f32 = 0.5;
const NUM_COORDS: usize = 3;

/// Outer eye corners, image left then image right, in landmark and in
/// detector keypoint numbering.
const EYE_LANDMARKS: (usize, usize) = (33, 263);
const EYE_KEYPOINTS: (usize, usize) = (0, 1);

/// First stage: proposes faces in a whole frame.
pub trait FaceLocator {
    /// Detections in `[0, 1]` frame units, most confident first.
    fn locate(&mut self, rgb: &RgbImage, min_confidence: f32) -> Result<Vec<Detection>, Error>;
}

/// Second stage: places the landmarks of the face inside a crop.
pub trait LandmarkRegression {
    /// Landmarks in frame pixels and the presence score of the face in `roi`.
    fn regress(
        &mut self,
        rgb: &RgbImage,
        roi: &Roi,
    ) -> Result<(Vec<na::Point2<f32>>, f32), Error>;
}

impl FaceLocator for FaceDetector {
    fn locate(&mut self, rgb: &RgbImage, min_confidence: f32) -> Result<Vec<Detection>, Error> {
        self.set_confidence_threshold(min_confidence);
        self.detect(rgb)
    }
}

/// Regresses 468 landmarks from a square face crop.
pub struct LandmarkRegressor {
    session: Session,
    layout: TensorLayout,
}

impl LandmarkRegressor {
    pub fn new(model_src: &Path, layout: TensorLayout, device: Device) -> Result<Self, Error> {
        let session = device::load_session(model_src, device)?;
        let mut regressor = Self { session, layout };

        let size = INPUT_SIZE as u32;
        let blank = RgbImage::new(size, size);
        let half = INPUT_SIZE as f32 / 2.0;
        regressor
            .regress(&blank, &Roi::new(half, half, INPUT_SIZE as f32, 0.0))
            .map_err(|err| Error::IncompatibleModel {
                path: model_src.to_path_buf(),
                reason: err.to_string(),
            })?;

        Ok(regressor)
    }
}

impl LandmarkRegression for LandmarkRegressor {
    fn regress(
        &mut self,
        rgb: &RgbImage,
        roi: &Roi,
    ) -> Result<(Vec<na::Point2<f32>>, f32), Error> {
        let crop = tensor::crop(rgb, roi, INPUT_SIZE as u32);
        let input = tensor::to_batch(&crop, self.layout, |v, _| v / 255.0);

        let outputs = device::run_session(&mut self.session, input.view())?;

        let mut coords = None;
        let mut presence = None;
        for out in outputs {
            match out.len() {
                n if n == LANDMARK_COUNT * NUM_COORDS => coords = Some(out),
                1 => presence = Some(out[0]),
                _ => (),
            }
        }

        match (coords, presence) {
            (Some(coords), Some(logit)) => {
                Ok((crop_to_frame(&coords, roi), 1.0 / (1.0 + (-logit).exp())))
            }
            _ => Err(Error::InvalidModelOutput(format!(
                "expected {} landmark coordinates and a presence score",
                LANDMARK_COUNT * NUM_COORDS
            ))),
        }
    }
}

/// Two-stage face mesh: face proposals refined by a landmark regressor.
///
/// Outside static-image mode the crops for the next frame come from the
/// current landmarks, rotated to the eye line, and the locator only runs
/// while fewer than `max_faces` faces are tracked.
pub struct FaceMesh<D, R> {
    locator: D,
    regressor: R,
    tracked: Vec<Roi>,
}

pub type OnnxFaceMesh = FaceMesh<FaceDetector, LandmarkRegressor>;

impl OnnxFaceMesh {
    pub fn new(
        paths: &ModelPaths,
        config: &DetectorConfig,
        device: Device,
    ) -> Result<Self, Error> {
        let detector = FaceDetector::new(
            &paths.face_detector,
            FaceDetectorConfig::new(config.min_detection_confidence, paths.layout),
            device,
        )?;
        let regressor = LandmarkRegressor::new(&paths.face_mesh, paths.layout, device)?;

        Ok(Self::from_parts(detector, regressor))
    }
}

impl<D, R> FaceMesh<D, R> {
    pub fn from_parts(locator: D, regressor: R) -> Self {
        Self {
            locator,
            regressor,
            tracked: Vec::new(),
        }
    }

    /// Crops carried over to the next frame.
    #[inline]
    pub fn tracked(&self) -> &[Roi] {
        &self.tracked
    }

    /// Forgets tracked faces; the next frame runs the locator.
    pub fn reset(&mut self) {
        self.tracked.clear();
    }
}

impl<D: FaceLocator, R: LandmarkRegression> LandmarkModel for FaceMesh<D, R> {
    #[inline]
    fn landmark_count(&self) -> usize {
        LANDMARK_COUNT
    }

    fn process(
        &mut self,
        rgb: &Frame,
        config: &DetectorConfig,
    ) -> Result<Vec<Vec<na::Point2<f32>>>, Error> {
        let image = rgb.to_rgb_image();
        let (fw, fh) = image.dimensions();
        let tracking = !config.static_image_mode;

        let mut rois = if tracking {
            std::mem::take(&mut self.tracked)
        } else {
            self.tracked.clear();
            Vec::new()
        };

        if rois.len() < config.max_faces {
            let dets = self
                .locator
                .locate(&image, config.min_detection_confidence)?;
            log::trace!("face locator proposed {} faces", dets.len());

            merge_detections(&mut rois, &dets, config.max_faces, fw as f32, fh as f32);
        }

        let mut faces = Vec::with_capacity(rois.len());
        for roi in rois {
            let (points, presence) = self.regressor.regress(&image, &roi)?;
            if tracking && presence < config.min_tracking_confidence {
                log::trace!("lost face at {:?} (presence {:.2})", roi, presence);
                continue;
            }

            if tracking {
                if let Some(next) = roi_from_landmarks(&points) {
                    self.tracked.push(next);
                }
            }

            faces.push(
                points
                    .iter()
                    .map(|p| na::Point2::new(p.x / fw as f32, p.y / fh as f32))
                    .collect(),
            );
        }

        Ok(faces)
    }
}

/// Angle of the line from `a` to `b`, zero for a level pair.
#[inline]
fn eye_angle(a: (f32, f32), b: (f32, f32)) -> f32 {
    (b.1 - a.1).atan2(b.0 - a.0)
}

/// Crop for a detection (in `[0, 1]` frame units), turned to its eye line.
fn roi_from_detection(det: &Detection, fw: f32, fh: f32) -> Option<Roi> {
    let (l, r) = EYE_KEYPOINTS;
    let (a, b) = (det.keypoints[l], det.keypoints[r]);
    let angle = eye_angle((a.0 * fw, a.1 * fh), (b.0 * fw, b.1 * fh));

    let roi = Roi {
        angle,
        ..Roi::around(&det.bbox().scaled(fw, fh))
    };

    Some(roi.scaled(ROI_SCALE)).filter(Roi::is_valid)
}

/// Crop for the next frame, enclosing `points` along their eye line.
fn roi_from_landmarks(points: &[na::Point2<f32>]) -> Option<Roi> {
    let (l, r) = EYE_LANDMARKS;
    let angle = match (points.get(l), points.get(r)) {
        (Some(a), Some(b)) => eye_angle((a.x, a.y), (b.x, b.y)),
        _ => 0.0,
    };

    Roi::enclosing(points.iter(), angle).map(|roi| roi.scaled(ROI_SCALE))
}

/// Adds crops for `dets` that do not duplicate a tracked face, up to
/// `max_faces` crops in total.
fn merge_detections(
    rois: &mut Vec<Roi>,
    dets: &[Detection],
    max_faces: usize,
    fw: f32,
    fh: f32,
) {
    for det in dets {
        if rois.len() >= max_faces {
            break;
        }

        let roi = match roi_from_detection(det, fw, fh) {
            Some(roi) => roi,
            None => continue,
        };

        let bounds = roi.bounds();
        if rois
            .iter()
            .any(|tracked| tracked.bounds().iou(&bounds) > TRACKED_IOU)
        {
            continue;
        }

        rois.push(roi);
    }
}

/// Maps regressor output (x, y, z triples in input pixels) to frame pixels.
fn crop_to_frame(coords: &[f32], roi: &Roi) -> Vec<na::Point2<f32>> {
    let size = INPUT_SIZE as f32;

    coords
        .chunks_exact(NUM_COORDS)
        .map(|c| roi.to_frame(c[0] / size, c[1] / size))
        .collect()
}
