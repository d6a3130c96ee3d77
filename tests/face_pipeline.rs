//! Drives the two-stage face mesh through the landmark detector with stand-in
//! stages, so the whole path from proposals to pixel landmarks runs without
//! model files.

use facemesh_fer::{
    ColorOrder, Detection, DetectorConfig, Error, FaceLocator, FaceMesh, Frame,
    LandmarkDetector, LandmarkRegression, Roi,
};
use image::RgbImage;
use nalgebra as na;

const LANDMARKS: usize = 468;

/// One upright face in the middle of the frame.
struct OneFace;

impl FaceLocator for OneFace {
    fn locate(&mut self, _: &RgbImage, _: f32) -> Result<Vec<Detection>, Error> {
        Ok(vec![Detection {
            x: 0.5,
            y: 0.5,
            w: 0.3,
            h: 0.4,
            confidence: 0.95,
            keypoints: [
                (0.45, 0.45),
                (0.55, 0.45),
                (0.5, 0.5),
                (0.5, 0.6),
                (0.4, 0.5),
                (0.6, 0.5),
            ],
        }])
    }
}

/// Spreads the landmarks over a ring spanning two thirds of the crop, so the
/// crop rebuilt from them keeps its size.
struct Ring;

impl LandmarkRegression for Ring {
    fn regress(
        &mut self,
        _: &RgbImage,
        roi: &Roi,
    ) -> Result<(Vec<na::Point2<f32>>, f32), Error> {
        let points = (0..LANDMARKS)
            .map(|i| {
                let t = i as f32 / LANDMARKS as f32 * std::f32::consts::TAU;
                roi.to_frame(0.5 + t.cos() / 3.0, 0.5 + t.sin() / 3.0)
            })
            .collect();

        Ok((points, 0.99))
    }
}

fn detector(config: DetectorConfig) -> LandmarkDetector<FaceMesh<OneFace, Ring>> {
    LandmarkDetector::new(FaceMesh::from_parts(OneFace, Ring), config).unwrap()
}

#[test]
fn single_face_yields_one_full_set_in_bounds() {
    let mut detector = detector(DetectorConfig::new(true, 2, 0.5, 0.5));
    let frame = Frame::filled(320, 240, ColorOrder::Bgr, [90, 90, 90]);

    let result = detector.detect(frame, true);

    assert_eq!(result.len(), 1);
    assert_eq!(result.faces[0].len(), LANDMARKS);
    for p in result.faces[0].iter() {
        assert!((0..320).contains(&p.x) && (0..240).contains(&p.y), "{:?}", p);
    }

    // the mesh went onto the frame in green
    assert!(result
        .frame
        .pixels()
        .lanes(ndarray::Axis(2))
        .into_iter()
        .any(|px| px[1] == 255 && px[0] == 0));
}

#[test]
fn tracking_follows_the_face_across_frames() {
    let mut detector = detector(DetectorConfig::new(false, 1, 0.5, 0.5));

    let mut last = None;
    for _ in 0..3 {
        let frame = Frame::filled(320, 240, ColorOrder::Bgr, [0, 0, 0]);
        let result = detector.detect(frame, false);
        assert_eq!(result.len(), 1);

        let bbox = result.faces[0].bbox().unwrap();
        if let Some(prev) = last.replace(bbox) {
            assert!(bbox.iou(&prev) > 0.9);
        }
    }

    assert_eq!(detector.model().tracked().len(), 1);
}
