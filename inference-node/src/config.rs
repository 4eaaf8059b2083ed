use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InferenceConfig {
    pub soil_model: SoilModelConfig,
    pub crop_model: CropModelConfig,
    pub reference: ReferenceDataConfig,
    pub fetch: FetchConfig,
    pub limits: RangeLimits,
    pub prefilter: PrefilterConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SoilModelConfig {
    pub model_path: PathBuf,
    /// Class names in output order. Ignored when `class_labels_path` is set.
    pub class_names: Vec<String>,
    /// JSON object mapping output index to class name, e.g. `{"0": "Clay_Trained"}`.
    pub class_labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub training_suffix: String,
    /// Set when the exported graph emits logits instead of probabilities.
    pub apply_softmax: bool,
    pub inference_backend: InferenceBackend,
    pub intra_threads: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CropModelConfig {
    pub model_path: PathBuf,
    /// `.json` array in class-index order, or the training `.csv` (see `label_column`).
    pub labels_path: PathBuf,
    pub label_column: String,
    pub confidence_threshold: f32,
    pub feature_contract: FeatureContract,
    pub probability_output: String,
    pub inference_backend: InferenceBackend,
    pub intra_threads: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReferenceDataConfig {
    /// Table with `Crops`, `Helps` and `Avoid` columns.
    pub relationships_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_image_bytes: usize,
}

/// Acceptable window for converted nutrients (kg/ha) and pH.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RangeLimits {
    pub npk_min: f64,
    pub npk_max: f64,
    pub ph_min: f64,
    pub ph_max: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PrefilterConfig {
    pub enabled: bool,
    pub sample_size: u32,
    pub min_brown_ratio: f32,
    pub max_mean_saturation: f32,
    pub min_edge_density: f32,
    pub max_edge_density: f32,
    pub edge_threshold: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum InferenceBackend {
    Cpu,
    Cuda,
    TensorRT,
    OpenVINO,
}

/// Feature layout expected by the crop model.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureContract {
    /// Pick from the model's declared input width.
    Auto,
    NpkPh,
    NpkPhTexture,
}

impl Default for SoilModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/soil_texture.onnx"),
            class_names: vec![
                "Clay_Trained".to_string(),
                "Loamy_Trained".to_string(),
                "Sandy_Trained".to_string(),
                "Silt_Trained".to_string(),
            ],
            class_labels_path: None,
            input_width: 224,
            input_height: 224,
            confidence_threshold: 0.5,
            training_suffix: "_Trained".to_string(),
            apply_softmax: false,
            inference_backend: InferenceBackend::Cpu,
            intra_threads: None,
        }
    }
}

impl Default for CropModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/crop_recommender.onnx"),
            labels_path: PathBuf::from("models/crop_labels.json"),
            label_column: "label".to_string(),
            confidence_threshold: 0.5,
            feature_contract: FeatureContract::Auto,
            probability_output: "probabilities".to_string(),
            inference_backend: InferenceBackend::Cpu,
            intra_threads: Some(1),
        }
    }
}

impl Default for ReferenceDataConfig {
    fn default() -> Self {
        Self {
            relationships_path: PathBuf::from("models/companion_crops.csv"),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_image_bytes: 20 * 1024 * 1024, // 20MB
        }
    }
}

impl Default for RangeLimits {
    fn default() -> Self {
        Self {
            npk_min: 0.0,
            npk_max: 500.0,
            ph_min: 3.5,
            ph_max: 9.5,
        }
    }
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_size: 128,
            min_brown_ratio: 0.2,
            max_mean_saturation: 0.65,
            min_edge_density: 0.02,
            max_edge_density: 0.45,
            edge_threshold: 40.0,
        }
    }
}

/// Reads `path` (any format the `config` crate knows) and overlays `SOILSENSE__*` variables.
pub fn load_layered<T: DeserializeOwned>(path: &str) -> Result<T> {
    use config::{Config, Environment, File};

    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix("SOILSENSE").separator("__"))
        .build()
        .map_err(|e| PipelineError::ConfigError(e.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|e| PipelineError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let config = InferenceConfig::default();
        assert_eq!(config.soil_model.confidence_threshold, 0.5);
        assert_eq!(config.crop_model.confidence_threshold, 0.5);
        assert_eq!(config.fetch.timeout_secs, 15);
        assert_eq!(config.limits, RangeLimits { npk_min: 0.0, npk_max: 500.0, ph_min: 3.5, ph_max: 9.5 });
        assert!(!config.prefilter.enabled);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inference.yaml");
        std::fs::write(
            &path,
            "crop_model:\n  confidence_threshold: 0.7\n  feature_contract: npk_ph_texture\n",
        )
        .unwrap();

        let config: InferenceConfig = load_layered(path.to_str().unwrap()).unwrap();
        assert_eq!(config.crop_model.confidence_threshold, 0.7);
        assert_eq!(config.crop_model.feature_contract, FeatureContract::NpkPhTexture);
        assert_eq!(config.soil_model.input_width, 224);
    }
}
