use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array2, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info, instrument, warn};

use super::{softmax, ImageModel, TabularModel};
use crate::{
    config::{CropModelConfig, InferenceBackend, SoilModelConfig},
    error::{PipelineError, Result},
};

pub fn create_session(
    model_path: &Path,
    backend: InferenceBackend,
    intra_threads: Option<usize>,
) -> Result<Session> {
    let threads = intra_threads.unwrap_or_else(num_cpus::get);
    let mut session_builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads)?;

    // Configure hardware acceleration based on backend
    match backend {
        InferenceBackend::Cpu => {}
        InferenceBackend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                session_builder = session_builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                ])?;
            }
            #[cfg(not(feature = "cuda"))]
            {
                warn!("CUDA requested but not available in build. Falling back to CPU.");
            }
        }
        InferenceBackend::TensorRT => {
            #[cfg(feature = "tensorrt")]
            {
                session_builder = session_builder.with_execution_providers([
                    ort::execution_providers::TensorRTExecutionProvider::default().build(),
                ])?;
            }
            #[cfg(not(feature = "tensorrt"))]
            {
                warn!("TensorRT requested but not available. Falling back to CPU.");
            }
        }
        InferenceBackend::OpenVINO => {
            #[cfg(feature = "openvino")]
            {
                session_builder = session_builder.with_execution_providers([
                    ort::execution_providers::OpenVINOExecutionProvider::default().build(),
                ])?;
            }
            #[cfg(not(feature = "openvino"))]
            {
                warn!("OpenVINO requested but not available. Falling back to CPU.");
            }
        }
    }

    let session = session_builder.commit_from_file(model_path).map_err(|e| {
        PipelineError::InferenceError(format!(
            "Failed to load model {}: {}",
            model_path.display(),
            e
        ))
    })?;

    info!("Model loaded successfully: {}", model_path.display());
    Ok(session)
}

fn first_input_name(session: &Session) -> Result<String> {
    session
        .inputs
        .first()
        .map(|input| input.name.clone())
        .ok_or_else(|| PipelineError::InferenceError("Model declares no inputs".to_string()))
}

/// Resize to the model's input size and lay out as a 1x3xHxW tensor scaled to [0, 1].
pub fn image_to_tensor(image: &DynamicImage, width: u32, height: u32) -> Array4<f32> {
    let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    tensor
}

/// Image classification network exported to ONNX (one probability row per image).
pub struct OrtImageModel {
    session: Session,
    input_name: String,
    input_width: u32,
    input_height: u32,
    apply_softmax: bool,
}

impl OrtImageModel {
    pub fn load(config: &SoilModelConfig) -> Result<Self> {
        info!("Loading soil texture model from {}", config.model_path.display());
        let session = create_session(
            &config.model_path,
            config.inference_backend,
            config.intra_threads,
        )?;
        let input_name = first_input_name(&session)?;

        Ok(Self {
            session,
            input_name,
            input_width: config.input_width,
            input_height: config.input_height,
            apply_softmax: config.apply_softmax,
        })
    }
}

impl ImageModel for OrtImageModel {
    #[instrument(skip(self, image), level = "debug")]
    fn predict(&self, image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        if self.session.outputs.is_empty() {
            return Ok(None);
        }

        let input = Tensor::from_array(image_to_tensor(image, self.input_width, self.input_height))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input]?)
            .map_err(|e| PipelineError::ClassificationFailed(format!("Inference failed: {}", e)))?;

        let scores: Vec<f32> = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                PipelineError::ClassificationFailed(format!("Failed to extract tensor: {}", e))
            })?
            .iter()
            .copied()
            .collect();

        if scores.is_empty() {
            return Ok(None);
        }

        debug!("Soil model produced {} class scores", scores.len());
        Ok(Some(if self.apply_softmax { softmax(&scores) } else { scores }))
    }
}

/// Gradient-boosted (or any tabular) classifier exported to ONNX with ZipMap disabled,
/// so class probabilities arrive as a plain float tensor.
pub struct OrtTabularModel {
    session: Session,
    input_name: String,
    input_width: Option<usize>,
    probability_index: usize,
}

impl OrtTabularModel {
    pub fn load(config: &CropModelConfig) -> Result<Self> {
        info!("Loading crop recommendation model from {}", config.model_path.display());
        let session = create_session(
            &config.model_path,
            config.inference_backend,
            config.intra_threads,
        )?;
        let input_name = first_input_name(&session)?;

        let input_width = match &session.inputs[0].input_type {
            ValueType::Tensor { dimensions, .. } => dimensions
                .last()
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as usize),
            _ => None,
        };

        let probability_index = Self::probability_output(&session, &config.probability_output)?;

        info!(
            "Crop model input '{}' width {:?}, probabilities from output '{}'",
            input_name, input_width, session.outputs[probability_index].name
        );

        Ok(Self {
            session,
            input_name,
            input_width,
            probability_index,
        })
    }

    /// The named output, otherwise the last float tensor output.
    fn probability_output(session: &Session, name: &str) -> Result<usize> {
        if let Some(idx) = session.outputs.iter().position(|o| o.name == name) {
            return Ok(idx);
        }

        let fallback = session.outputs.iter().rposition(|o| {
            matches!(
                o.output_type,
                ValueType::Tensor { ty: TensorElementType::Float32, .. }
            )
        });

        match fallback {
            Some(idx) => {
                warn!(
                    "Output '{}' not found, using '{}' for class probabilities",
                    name, session.outputs[idx].name
                );
                Ok(idx)
            }
            None => Err(PipelineError::ConfigError(format!(
                "Crop model has no float probability output (looked for '{}')",
                name
            ))),
        }
    }
}

impl TabularModel for OrtTabularModel {
    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        let row = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| PipelineError::InferenceError(e.to_string()))?;
        let input = Tensor::from_array(row)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input]?)?;

        let probabilities = outputs[self.probability_index]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(probabilities)
    }
}
