use std::path::Path;

use ndarray::ArrayView4;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Requested execution device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA when the runtime reports it, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Device every session of a process runs on, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn select(preference: DevicePreference) -> Self {
        let device = match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Device::Cuda,
            DevicePreference::Auto => get_cuda_if_available(),
        };

        log::debug!("inference device: {:?} (requested {:?})", device, preference);

        device
    }
}

pub fn get_cuda_if_available() -> Device {
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => Device::Cuda,
        Ok(false) => Device::Cpu,
        Err(err) => {
            log::warn!("could not query CUDA availability, using CPU: {}", err);
            Device::Cpu
        }
    }
}

/// Opens an ONNX Runtime session for `path` on `device`.
///
/// A missing file is reported before the runtime gets to see it.
pub fn load_session(path: &Path, device: Device) -> Result<Session, Error> {
    if !path.is_file() {
        return Err(Error::ModelNotFound(path.to_path_buf()));
    }

    let session = build_session(path, device).map_err(|err| Error::IncompatibleModel {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    log::debug!("loaded {} on {:?}", path.display(), device);

    Ok(session)
}

fn build_session(path: &Path, device: Device) -> ort::Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    let builder = match device {
        Device::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default()
            .build()
            .error_on_failure()])?,
        Device::Cpu => builder,
    };

    builder.commit_from_file(path)
}

/// Runs a single-input graph and copies every output out as a flat vector.
pub fn run_session(
    session: &mut Session,
    input: ArrayView4<'_, f32>,
) -> Result<Vec<Vec<f32>>, Error> {
    Ok(run_inner(session, input)?)
}

fn run_inner(session: &mut Session, input: ArrayView4<'_, f32>) -> ort::Result<Vec<Vec<f32>>> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input)?])?;

    let mut result = Vec::with_capacity(outputs.len());
    for idx in 0..outputs.len() {
        let (_, data) = outputs[idx].try_extract_tensor::<f32>()?;
        result.push(data.to_vec());
    }

    Ok(result)
}
