use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;
use soilsense_common::SoilTexture;
use tracing::{debug, info, instrument, warn};

use super::labels::load_class_labels;
use super::ort_engine::OrtImageModel;
use super::{arg_max, ImageModel};
use crate::config::SoilModelConfig;
use crate::error::{PipelineError, Result};

/// Model labels that mean "this is not a soil photo".
pub const NOT_SOIL_LABELS: [&str; 4] = ["not_soil", "no_soil", "no_soil_detected", "notsoil"];

/// Maps a raw model label to a texture. Rules apply in order:
///
/// 1. not-soil labels give `NoSoilDetected`
/// 2. exact match against the label table
/// 3. first substring rule that matches (`clay`, `loam`, `sand`, `silt`)
/// 4. `Loamy`
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    training_suffix: String,
    not_soil: Vec<String>,
    exact: HashMap<String, SoilTexture>,
    substrings: Vec<(String, SoilTexture)>,
    fallback: SoilTexture,
}

impl LabelNormalizer {
    pub fn new(training_suffix: &str) -> Self {
        let exact = [
            ("sandy", SoilTexture::Sandy),
            ("sand", SoilTexture::Sandy),
            ("loamy", SoilTexture::Loamy),
            ("loam", SoilTexture::Loamy),
            ("clay", SoilTexture::Clay),
            ("clayey", SoilTexture::Clay),
            ("silt", SoilTexture::Silt),
            ("silty", SoilTexture::Silt),
        ]
        .into_iter()
        .map(|(label, texture)| (label.to_string(), texture))
        .collect();

        let substrings = [
            ("clay", SoilTexture::Clay),
            ("loam", SoilTexture::Loamy),
            ("sand", SoilTexture::Sandy),
            ("silt", SoilTexture::Silt),
        ]
        .into_iter()
        .map(|(needle, texture)| (needle.to_string(), texture))
        .collect();

        Self {
            training_suffix: training_suffix.to_lowercase(),
            not_soil: NOT_SOIL_LABELS.iter().map(|s| s.to_string()).collect(),
            exact,
            substrings,
            fallback: SoilTexture::Loamy,
        }
    }

    /// `"Sandy Loam_Trained"` becomes `"sandy_loam"`.
    pub fn canonical_form(&self, raw: &str) -> String {
        let mut label = raw.trim().to_lowercase();
        if !self.training_suffix.is_empty() {
            label = label.replace(&self.training_suffix, "");
        }
        label
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn resolve(&self, raw: &str) -> SoilTexture {
        let label = self.canonical_form(raw);

        if self.not_soil.iter().any(|s| *s == label) {
            return SoilTexture::NoSoilDetected;
        }
        if let Some(texture) = self.exact.get(&label) {
            return *texture;
        }
        if let Some((_, texture)) = self.substrings.iter().find(|(needle, _)| label.contains(needle.as_str())) {
            debug!("Label '{}' matched by substring rule", raw);
            return *texture;
        }

        warn!("Unrecognised soil label '{}', defaulting to {}", raw, self.fallback);
        self.fallback
    }
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new("_Trained")
    }
}

/// Turns a photo into a [`SoilTexture`], or `NoSoilDetected` when the model is unsure.
pub struct SoilClassifier {
    model: Arc<dyn ImageModel>,
    class_labels: Vec<String>,
    threshold: f32,
    normalizer: LabelNormalizer,
}

impl SoilClassifier {
    pub fn new(model: Arc<dyn ImageModel>, class_labels: Vec<String>, threshold: f32) -> Self {
        Self {
            model,
            class_labels,
            threshold,
            normalizer: LabelNormalizer::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: LabelNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn from_config(config: &SoilModelConfig) -> Result<Self> {
        let class_labels = match &config.class_labels_path {
            Some(path) => load_class_labels(path)?,
            None => config.class_names.clone(),
        };
        if class_labels.is_empty() {
            return Err(PipelineError::ConfigError("soil model has no class labels".to_string()));
        }

        let model = OrtImageModel::load(config)?;
        Ok(Self::new(Arc::new(model), class_labels, config.confidence_threshold)
            .with_normalizer(LabelNormalizer::new(&config.training_suffix)))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, image_bytes: &[u8]) -> Result<SoilTexture> {
        let image = image::load_from_memory(image_bytes)?;
        self.classify_image(&image)
    }

    #[instrument(skip(self, image), level = "debug")]
    pub fn classify_image(&self, image: &DynamicImage) -> Result<SoilTexture> {
        let probabilities = self.model.predict(image).map_err(|e| match e {
            PipelineError::ClassificationFailed(_) => e,
            other => PipelineError::ClassificationFailed(other.to_string()),
        })?;

        let Some(probabilities) = probabilities else {
            info!("Soil model returned no class probabilities");
            return Ok(SoilTexture::NoSoilDetected);
        };

        let Some((top_idx, confidence)) = arg_max(&probabilities) else {
            return Ok(SoilTexture::NoSoilDetected);
        };

        info!(
            "Soil confidence {:.3} (threshold: {})",
            confidence, self.threshold
        );
        if confidence < self.threshold {
            return Ok(SoilTexture::NoSoilDetected);
        }

        let raw_label = self.class_labels.get(top_idx).ok_or_else(|| {
            PipelineError::ClassificationFailed(format!("class index {} has no label", top_idx))
        })?;

        let texture = self.normalizer.resolve(raw_label);
        debug!("Soil label '{}' resolved to {}", raw_label, texture);
        Ok(texture)
    }
}
