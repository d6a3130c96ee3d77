use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Model {} is incompatible: {reason}", .path.display())]
    IncompatibleModel { path: PathBuf, reason: String },

    #[error("Invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("OnnxRuntime Error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
