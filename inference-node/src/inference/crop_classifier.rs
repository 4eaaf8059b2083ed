use std::sync::Arc;

use soilsense_common::{utils::canonical_label, CropPrediction, NormalizedNutrients, SoilTexture, NO_CROP};
use tracing::{info, instrument};

use super::features::{composer_for, FeatureComposer};
use super::labels::LabelIndex;
use super::ort_engine::OrtTabularModel;
use super::{arg_max, TabularModel};
use crate::config::CropModelConfig;
use crate::error::{PipelineError, Result};

/// Recommends a crop from converted nutrients, or `NoCrop` when the model is not sure.
pub struct CropClassifier {
    model: Arc<dyn TabularModel>,
    features: Box<dyn FeatureComposer>,
    labels: LabelIndex,
    threshold: f32,
}

impl CropClassifier {
    pub fn new(
        model: Arc<dyn TabularModel>,
        features: Box<dyn FeatureComposer>,
        labels: LabelIndex,
        threshold: f32,
    ) -> Self {
        Self {
            model,
            features,
            labels,
            threshold,
        }
    }

    pub fn from_config(config: &CropModelConfig) -> Result<Self> {
        let labels = LabelIndex::load(&config.labels_path, &config.label_column)?;
        let model = OrtTabularModel::load(config)?;
        let features = composer_for(config.feature_contract, model.input_width())?;

        Ok(Self::new(Arc::new(model), features, labels, config.confidence_threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[instrument(skip(self), level = "debug")]
    pub fn classify(&self, nutrients: &NormalizedNutrients, texture: SoilTexture) -> Result<CropPrediction> {
        let row = self.features.compose(nutrients, texture);
        if let Some(expected) = self.model.input_width() {
            if expected != row.len() {
                return Err(PipelineError::FeatureSchemaMismatch {
                    expected,
                    actual: row.len(),
                });
            }
        }

        let probabilities = self.model.predict_proba(&row)?;
        let Some((class_idx, confidence)) = arg_max(&probabilities) else {
            info!("Crop model returned no probabilities");
            return Ok(CropPrediction::NoCrop);
        };

        info!(
            "Crop confidence {:.3} (threshold: {})",
            confidence, self.threshold
        );
        if confidence < self.threshold {
            return Ok(CropPrediction::NoCrop);
        }

        let label = match self.labels.decode(class_idx) {
            Some(label) => canonical_label(label),
            None => {
                info!("Crop class {} is outside the label index", class_idx);
                return Ok(CropPrediction::NoCrop);
            }
        };

        if label == NO_CROP {
            return Ok(CropPrediction::NoCrop);
        }

        Ok(CropPrediction::Crop { label, confidence })
    }
}
