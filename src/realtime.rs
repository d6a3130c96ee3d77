//! Single-threaded capture → detect → display loop.
//!
//! Each stage blocks the next: there is no buffering, so a slow detector
//! lowers the displayed frame rate instead of dropping frames.

use image::DynamicImage;

use crate::bbox::BBox;
use crate::detector::{DetectionResult, LandmarkDetector, LandmarkModel};
use crate::emotion::{EmotionClassifier, EmotionLabel, EmotionModel};
use crate::error::Error;
use crate::fps::FpsCounter;
use crate::frame::Frame;

/// Supplies frames until exhausted.
pub trait FrameSource {
    /// `Ok(None)` once there are no more frames.
    fn read(&mut self) -> Result<Option<Frame>, Error>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        (**self).read()
    }
}

/// Frame source backed by any iterator of frames.
pub struct Frames<I>(pub I);

impl<I: Iterator<Item = Frame>> FrameSource for Frames<I> {
    #[inline]
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        Ok(self.0.next())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceAnnotation {
    /// Pixel bounds of the face landmarks.
    pub bbox: BBox,
    pub emotion: Option<EmotionLabel>,
}

/// Readouts drawn over a frame when it is displayed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hud {
    pub fps: u32,
    pub faces: Vec<FaceAnnotation>,
}

/// Where annotated frames end up.
pub trait Surface {
    fn render(&mut self, frame: &mut Frame, hud: &Hud) -> Result<(), Error>;

    /// Polled once per iteration, must not block.
    fn should_terminate(&mut self) -> Result<bool, Error>;
}

/// Headless surface that only logs the readout.
#[derive(Debug, Default)]
pub struct LogSurface {
    rendered: usize,
}

impl LogSurface {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn rendered(&self) -> usize {
        self.rendered
    }
}

impl Surface for LogSurface {
    fn render(&mut self, frame: &mut Frame, hud: &Hud) -> Result<(), Error> {
        self.rendered += 1;
        log::info!(
            "frame {} ({}x{}): FPS {} faces {}",
            self.rendered,
            frame.width(),
            frame.height(),
            hud.fps,
            hud.faces.len()
        );

        Ok(())
    }

    #[inline]
    fn should_terminate(&mut self) -> Result<bool, Error> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    FrameAcquired,
    Detected,
    Displayed,
    Terminated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: usize,
    pub faces: usize,
}

pub struct RealtimeLoop<S, M, O> {
    source: Option<S>,
    detector: LandmarkDetector<M>,
    surface: O,
    classifier: Option<EmotionClassifier<Box<dyn EmotionModel>>>,
    fps: FpsCounter,
    state: LoopState,
    acquired: Option<Frame>,
    detected: Option<(DetectionResult, Vec<FaceAnnotation>)>,
    stats: LoopStats,
}

impl<S, M, O> RealtimeLoop<S, M, O>
where
    S: FrameSource,
    M: LandmarkModel,
    O: Surface,
{
    pub fn new(source: S, detector: LandmarkDetector<M>, surface: O) -> Self {
        Self {
            source: Some(source),
            detector,
            surface,
            classifier: None,
            fps: FpsCounter::default(),
            state: LoopState::Idle,
            acquired: None,
            detected: None,
            stats: LoopStats::default(),
        }
    }

    /// Labels every detected face with its predicted emotion.
    pub fn with_classifier(mut self, classifier: EmotionClassifier<Box<dyn EmotionModel>>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_fps_counter(mut self, fps: FpsCounter) -> Self {
        self.fps = fps;
        self
    }

    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[inline]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    #[inline]
    pub fn surface(&self) -> &O {
        &self.surface
    }

    /// Whether the frame source is still held.
    #[inline]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Performs exactly one transition and returns the state reached.
    ///
    /// A surface error terminates the loop, releasing the source, before it
    /// is returned.
    pub fn step(&mut self) -> Result<LoopState, Error> {
        let next = match self.state {
            LoopState::Idle => Ok(self.acquire()),
            LoopState::FrameAcquired => Ok(self.detect()),
            LoopState::Detected => self.display(),
            LoopState::Displayed => self.surface.should_terminate().map(|stop| {
                if stop {
                    log::debug!("terminate requested");
                    LoopState::Terminated
                } else {
                    LoopState::Idle
                }
            }),
            LoopState::Terminated => Ok(LoopState::Terminated),
        };

        let next = match next {
            Ok(next) => next,
            Err(err) => {
                log::warn!("output surface failed, stopping: {}", err);
                self.release();
                self.state = LoopState::Terminated;

                return Err(err);
            }
        };

        if next == LoopState::Terminated {
            self.release();
        }

        log::trace!("{:?} -> {:?}", self.state, next);
        self.state = next;

        Ok(next)
    }

    pub fn run(&mut self) -> Result<LoopStats, Error> {
        self.run_with(|_| ())
    }

    /// Runs to termination, reporting every state reached to `observer`.
    pub fn run_with<F: FnMut(LoopState)>(&mut self, mut observer: F) -> Result<LoopStats, Error> {
        while self.state != LoopState::Terminated {
            let state = self.step()?;
            observer(state);
        }

        log::debug!(
            "loop terminated after {} frames ({} faces)",
            self.stats.frames,
            self.stats.faces
        );

        Ok(self.stats)
    }

    fn acquire(&mut self) -> LoopState {
        let Some(source) = self.source.as_mut() else {
            return LoopState::Terminated;
        };

        match source.read() {
            Ok(Some(frame)) => {
                self.acquired = Some(frame);
                LoopState::FrameAcquired
            }
            Ok(None) => {
                log::debug!("frame source exhausted");
                LoopState::Terminated
            }
            Err(err) => {
                log::warn!("frame source failed, stopping: {}", err);
                LoopState::Terminated
            }
        }
    }

    fn detect(&mut self) -> LoopState {
        let Some(frame) = self.acquired.take() else {
            return LoopState::Idle;
        };

        let result = match self.classifier.as_mut() {
            None => self.detector.detect(frame, true),
            Some(classifier) => {
                let mut result = self.detector.detect(frame, false);
                let labels = classify_faces(classifier, &result);
                self.detector.draw(&mut result.frame, &result.faces);
                self.detected = Some((result, labels));

                return LoopState::Detected;
            }
        };

        let faces = result
            .faces
            .iter()
            .filter_map(|face| face.bbox())
            .map(|bbox| FaceAnnotation {
                bbox,
                emotion: None,
            })
            .collect();

        self.detected = Some((result, faces));

        LoopState::Detected
    }

    fn display(&mut self) -> Result<LoopState, Error> {
        let Some((result, faces)) = self.detected.take() else {
            return Ok(LoopState::Idle);
        };

        let DetectionResult { mut frame, faces: landmarks } = result;
        let hud = Hud {
            fps: self.fps.tick(),
            faces,
        };

        self.surface.render(&mut frame, &hud)?;

        self.stats.frames += 1;
        self.stats.faces += landmarks.len();

        Ok(LoopState::Displayed)
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            log::debug!("released frame source");
        }

        self.acquired = None;
        self.detected = None;
    }
}

fn classify_faces(
    classifier: &mut EmotionClassifier<Box<dyn EmotionModel>>,
    result: &DetectionResult,
) -> Vec<FaceAnnotation> {
    result
        .faces
        .iter()
        .filter_map(|face| face.bbox())
        .map(|bbox| {
            let emotion = result.frame.crop_rgb(&bbox).and_then(|crop| {
                match classifier.predict(&DynamicImage::ImageRgb8(crop)) {
                    Ok(label) => Some(label),
                    Err(err) => {
                        log::warn!("emotion prediction failed: {}", err);
                        None
                    }
                }
            });

            FaceAnnotation { bbox, emotion }
        })
        .collect()
}
