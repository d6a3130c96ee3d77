pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod device;
pub mod emotion;
pub mod error;
pub mod face_detector;
pub mod face_mesh;
pub mod fps;
pub mod frame;
pub mod landmarks;
pub mod mesh;
pub mod realtime;
pub mod roi;
pub mod tensor;
#[cfg(feature = "opencv")]
pub mod video;

mod circular_queue;

pub use bbox::BBox;
pub use config::{ClassifierConfig, Connections, DetectorConfig, MeshStyle, ModelPaths, Settings};
pub use detection::Detection;
pub use detector::{DetectionResult, LandmarkDetector, LandmarkModel};
pub use device::{Device, DevicePreference};
pub use emotion::{EmotionClassifier, EmotionLabel, EmotionModel, OnnxEmotionModel};
pub use error::{Error, Result};
pub use face_mesh::{FaceLocator, FaceMesh, LandmarkRegression, OnnxFaceMesh};
pub use fps::FpsCounter;
pub use frame::{ColorOrder, Frame};
pub use landmarks::FaceLandmarkSet;
pub use realtime::{FrameSource, Hud, LoopState, LoopStats, RealtimeLoop, Surface};
pub use roi::Roi;

/// Loads the two-stage face mesh described by `paths` behind a landmark detector.
pub fn load_face_mesh(
    paths: &ModelPaths,
    config: DetectorConfig,
) -> Result<LandmarkDetector<OnnxFaceMesh>> {
    let device = Device::select(paths.device);
    let model = OnnxFaceMesh::new(paths, &config, device)?;

    LandmarkDetector::new(model, config)
}
