use nalgebra as na;

use crate::config::DetectorConfig;
use crate::error::Error;
use crate::frame::Frame;
use crate::landmarks::FaceLandmarkSet;
use crate::mesh;

/// Backend turning an RGB frame into normalized landmarks.
///
/// Implementations own whatever inter-frame state they keep; the detector only
/// hands them the configuration it was built with.
pub trait LandmarkModel {
    /// Fixed number of landmarks per face.
    fn landmark_count(&self) -> usize;

    /// Landmarks in `[0, 1]` frame units, one vector per detected face.
    fn process(
        &mut self,
        rgb: &Frame,
        config: &DetectorConfig,
    ) -> Result<Vec<Vec<na::Point2<f32>>>, Error>;
}

impl<M: LandmarkModel + ?Sized> LandmarkModel for Box<M> {
    #[inline]
    fn landmark_count(&self) -> usize {
        (**self).landmark_count()
    }

    #[inline]
    fn process(
        &mut self,
        rgb: &Frame,
        config: &DetectorConfig,
    ) -> Result<Vec<Vec<na::Point2<f32>>>, Error> {
        (**self).process(rgb, config)
    }
}

/// Frame after detection together with the faces found in it.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub frame: Frame,
    pub faces: Vec<FaceLandmarkSet>,
}

impl DetectionResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

pub struct LandmarkDetector<M> {
    model: M,
    config: DetectorConfig,
}

impl<M: LandmarkModel> LandmarkDetector<M> {
    pub fn new(model: M, config: DetectorConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self { model, config })
    }

    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Finds up to `max_faces` faces in `frame`.
    ///
    /// A frame without faces, or one the backend fails on, yields an empty
    /// result; this never errors. With `draw` set the mesh is rendered onto the
    /// returned frame.
    pub fn detect(&mut self, frame: Frame, draw: bool) -> DetectionResult {
        let rgb = frame.to_rgb();
        let (width, height) = frame.dims();

        let raw = match self.model.process(&rgb, &self.config) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("landmark inference failed, treating frame as empty: {}", err);
                Vec::new()
            }
        };

        let expected = self.model.landmark_count();
        let faces: Vec<_> = raw
            .into_iter()
            .filter(|points| {
                if points.len() != expected {
                    log::warn!(
                        "dropping face with {} landmarks, expected {}",
                        points.len(),
                        expected
                    );
                    return false;
                }

                if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
                    log::warn!("dropping face with non-finite landmarks");
                    return false;
                }

                true
            })
            .take(self.config.max_faces)
            .map(|points| FaceLandmarkSet::from_normalized(&points, width, height))
            .collect();

        let mut result = DetectionResult { frame, faces };

        if draw {
            self.draw(&mut result.frame, &result.faces);
        }

        result
    }

    /// Renders `faces` with this detector's mesh style.
    pub fn draw(&self, frame: &mut Frame, faces: &[FaceLandmarkSet]) {
        mesh::draw_landmarks(frame, faces, &self.config.mesh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ColorOrder;
    use crate::landmarks::LANDMARK_COUNT;

    struct Fixed {
        faces: Vec<Vec<na::Point2<f32>>>,
        count: usize,
        seen: Vec<ColorOrder>,
    }

    impl Fixed {
        fn new(faces: usize, count: usize) -> Self {
            let face = (0..count)
                .map(|i| na::Point2::new(0.25 + i as f32 * 0.001, 0.5))
                .collect::<Vec<_>>();

            Self {
                faces: vec![face; faces],
                count,
                seen: Vec::new(),
            }
        }
    }

    impl LandmarkModel for Fixed {
        fn landmark_count(&self) -> usize {
            self.count
        }

        fn process(
            &mut self,
            rgb: &Frame,
            config: &DetectorConfig,
        ) -> Result<Vec<Vec<na::Point2<f32>>>, Error> {
            self.seen.push(rgb.order());
            Ok(self.faces.iter().take(config.max_faces).cloned().collect())
        }
    }

    struct Failing;

    impl LandmarkModel for Failing {
        fn landmark_count(&self) -> usize {
            468
        }

        fn process(
            &mut self,
            _: &Frame,
            _: &DetectorConfig,
        ) -> Result<Vec<Vec<na::Point2<f32>>>, Error> {
            Err(Error::InvalidModelOutput("boom".into()))
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = DetectorConfig::new(false, 0, 0.5, 0.5);
        assert!(LandmarkDetector::new(Fixed::new(1, 4), config).is_err());
    }

    #[test]
    fn no_faces_leaves_frame_untouched() {
        let mut detector = LandmarkDetector::new(Fixed::new(0, 4), DetectorConfig::default())
            .unwrap();
        let frame = Frame::filled(32, 24, ColorOrder::Bgr, [7, 7, 7]);

        let result = detector.detect(frame.clone(), true);

        assert!(result.is_empty());
        assert_eq!(result.frame, frame);
    }

    #[test]
    fn backend_failure_is_an_empty_result() {
        let mut detector = LandmarkDetector::new(Failing, DetectorConfig::default()).unwrap();
        let result = detector.detect(Frame::filled(8, 8, ColorOrder::Bgr, [0, 0, 0]), true);

        assert!(result.is_empty());
    }

    #[test]
    fn maps_to_pixels_and_feeds_rgb() {
        let mut detector =
            LandmarkDetector::new(Fixed::new(1, 3), DetectorConfig::default()).unwrap();
        let result = detector.detect(Frame::filled(100, 40, ColorOrder::Bgr, [0, 0, 0]), false);

        assert_eq!(result.len(), 1);
        assert_eq!(result.faces[0].as_slice()[0], na::Point2::new(25, 20));
        assert_eq!(result.faces[0].as_slice()[2], na::Point2::new(25, 20));
        assert_eq!(detector.model().seen, vec![ColorOrder::Rgb]);

        // draw = false must not alter pixels
        assert!(result.frame.pixels().iter().all(|&v| v == 0));
        assert_eq!(result.frame.order(), ColorOrder::Bgr);
    }

    #[test]
    fn draw_mutates_frame() {
        let mut detector =
            LandmarkDetector::new(Fixed::new(1, 3), DetectorConfig::default()).unwrap();
        let result = detector.detect(Frame::filled(100, 40, ColorOrder::Bgr, [0, 0, 0]), true);

        // green in BGR order
        assert_eq!(result.frame.pixels()[[20, 25, 1]], 255);
        assert_eq!(result.frame.pixels()[[20, 25, 0]], 0);
    }

    #[test]
    fn non_finite_landmarks_are_dropped_before_drawing() {
        let mut model = Fixed::new(2, LANDMARK_COUNT);
        model.faces[0][10].x = f32::INFINITY;
        model.faces[0][338].x = f32::NEG_INFINITY;
        model.faces[1][0].y = f32::NAN;

        let mut detector = LandmarkDetector::new(model, DetectorConfig::default()).unwrap();
        let frame = Frame::filled(64, 48, ColorOrder::Bgr, [0, 0, 0]);
        let result = detector.detect(frame.clone(), true);

        assert!(result.is_empty());
        assert_eq!(result.frame, frame);
    }

    #[test]
    fn huge_finite_landmarks_are_kept_and_clipped() {
        let mut model = Fixed::new(1, LANDMARK_COUNT);
        model.faces[0][10].x = 1e9;
        model.faces[0][338].x = -1e9;

        let mut detector = LandmarkDetector::new(model, DetectorConfig::default()).unwrap();
        let result = detector.detect(Frame::filled(64, 48, ColorOrder::Bgr, [0, 0, 0]), true);

        assert_eq!(result.len(), 1);
        assert!(result.frame.pixels().iter().any(|&v| v == 255));
    }

    #[test]
    fn caps_faces_and_drops_wrong_sizes() {
        let mut model = Fixed::new(3, 5);
        model.faces[0].pop();

        let config = DetectorConfig::new(true, 2, 0.5, 0.5);
        let mut detector = LandmarkDetector::new(model, config).unwrap();
        let result = detector.detect(Frame::filled(10, 10, ColorOrder::Rgb, [0, 0, 0]), false);

        // the model hands back two faces, the short one is discarded
        assert_eq!(result.len(), 1);
        assert!(result.faces.iter().all(|f| f.len() == 5));
    }
}
