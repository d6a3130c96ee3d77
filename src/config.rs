//! Serializable settings for the detector, the classifier and the real-time loop.
//!
//! Every struct defaults field by field, so a settings file only needs to name
//! what it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::device::DevicePreference;
use crate::error::Error;
use crate::tensor::TensorLayout;

pub const MAX_THICKNESS: u32 = 32;
pub const MAX_CIRCLE_RADIUS: u32 = 64;

/// Which landmark pairs the overlay joins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connections {
    /// Triangulated surface over all landmarks.
    #[default]
    Tessellation,
    /// Face oval, eyes, eyebrows and lips only.
    Contours,
}

/// Stroke used when rendering landmarks over a frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MeshStyle {
    pub connections: Connections,
    pub thickness: u32,
    pub circle_radius: u32,
    /// RGB
    pub color: [u8; 3],
}

impl Default for MeshStyle {
    fn default() -> Self {
        Self {
            connections: Connections::Tessellation,
            thickness: 1,
            circle_radius: 2,
            color: [0, 255, 0],
        }
    }
}

impl MeshStyle {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_THICKNESS).contains(&self.thickness) {
            return Err(Error::InvalidConfig(format!(
                "mesh thickness must be within [1, {}], got {}",
                MAX_THICKNESS, self.thickness
            )));
        }

        if self.circle_radius > MAX_CIRCLE_RADIUS {
            return Err(Error::InvalidConfig(format!(
                "mesh circle_radius must be at most {}, got {}",
                MAX_CIRCLE_RADIUS, self.circle_radius
            )));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Run detection afresh on every call instead of tracking faces between frames.
    pub static_image_mode: bool,
    pub max_faces: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub mesh: MeshStyle,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_faces: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            mesh: MeshStyle::default(),
        }
    }
}

impl DetectorConfig {
    pub fn new(
        static_image_mode: bool,
        max_faces: usize,
        min_detection_confidence: f32,
        min_tracking_confidence: f32,
    ) -> Self {
        Self {
            static_image_mode,
            max_faces,
            min_detection_confidence,
            min_tracking_confidence,
            mesh: MeshStyle::default(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_faces == 0 {
            return Err(Error::InvalidConfig("max_faces must be positive".into()));
        }

        check_unit_range("min_detection_confidence", self.min_detection_confidence)?;
        check_unit_range("min_tracking_confidence", self.min_tracking_confidence)?;

        self.mesh.validate()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// ONNX export of the trained classifier.
    pub weights: PathBuf,
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub device: DevicePreference,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("models/emotion_resnet18.onnx"),
            input_size: 48,
            mean: [0.5; 3],
            std: [0.5; 3],
            device: DevicePreference::Auto,
        }
    }
}

impl ClassifierConfig {
    pub fn with_weights<P: Into<PathBuf>>(weights: P) -> Self {
        Self {
            weights: weights.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.input_size == 0 {
            return Err(Error::InvalidConfig("input_size must be positive".into()));
        }

        if self.std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "std must be positive, got {:?}",
                self.std
            )));
        }

        Ok(())
    }
}

/// Locations of the landmark graphs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub face_mesh: PathBuf,
    pub layout: TensorLayout,
    pub device: DevicePreference,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("models/face_detection_short_range.onnx"),
            face_mesh: PathBuf::from("models/face_landmark.onnx"),
            layout: TensorLayout::Nhwc,
            device: DevicePreference::Auto,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Number of frame intervals averaged by the FPS readout.
    pub fps_window: usize,
    /// Label each tracked face with its predicted emotion.
    pub show_emotions: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            fps_window: 1,
            show_emotions: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub detector: DetectorConfig,
    pub models: ModelPaths,
    pub classifier: ClassifierConfig,
    pub realtime: RealtimeConfig,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.validate()?;

        log::debug!("loaded settings from {}", path.as_ref().display());

        Ok(settings)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.detector.validate()?;
        self.classifier.validate()
    }
}

fn check_unit_range(name: &str, value: f32) -> Result<(), Error> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}
