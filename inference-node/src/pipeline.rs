//! End-to-end decision: photo + readings in, texture, crop and companions out.
//!
//! ```text
//! Start -> SoilClassified -> RangeChecked -> CropClassified -> Done
//!   |                           |                 |
//!   +-- no soil ----------------+-- no crop ------+-------------> Done
//! ```
//!
//! `NoSoilDetected`, out-of-range readings and `NoCrop` are ordinary results. Only fetch,
//! model and contract failures abort the run.

use std::sync::Arc;

use chrono::Utc;
use soilsense_common::{
    CropPrediction, NormalizedNutrients, PredictionRequest, PredictionResult, SoilResultRecord,
    SoilTexture,
};
use tracing::{info, instrument, warn};

use crate::{
    config::{InferenceConfig, RangeLimits},
    conversion,
    error::{PipelineError, Result},
    fetch::ImageSource,
    inference::{CropClassifier, SoilClassifier},
    prefilter::SoilColorPrefilter,
    relationships::RelationshipTable,
    sink::ResultSink,
};

impl RangeLimits {
    /// Name of the first reading outside its window, if any.
    pub fn violation(&self, values: &NormalizedNutrients) -> Option<&'static str> {
        let npk = |v: f64| (self.npk_min..=self.npk_max).contains(&v);
        if !npk(values.n) {
            Some("N")
        } else if !npk(values.p) {
            Some("P")
        } else if !npk(values.k) {
            Some("K")
        } else if !(self.ph_min..=self.ph_max).contains(&values.ph) {
            Some("ph")
        } else {
            None
        }
    }
}

/// Loaded models and tables plus the collaborators they report to. Shared read-only
/// between requests.
pub struct Pipeline {
    images: Arc<dyn ImageSource>,
    prefilter: Option<SoilColorPrefilter>,
    soil: Arc<SoilClassifier>,
    crop: Arc<CropClassifier>,
    relationships: Arc<RelationshipTable>,
    sink: Arc<dyn ResultSink>,
    limits: RangeLimits,
}

impl Pipeline {
    pub fn new(
        images: Arc<dyn ImageSource>,
        soil: SoilClassifier,
        crop: CropClassifier,
        relationships: RelationshipTable,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            images,
            prefilter: None,
            soil: Arc::new(soil),
            crop: Arc::new(crop),
            relationships: Arc::new(relationships),
            sink,
            limits: RangeLimits::default(),
        }
    }

    pub fn with_prefilter(mut self, prefilter: Option<SoilColorPrefilter>) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn with_limits(mut self, limits: RangeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Load every artifact named in `config`. Called once at startup.
    pub fn from_config(
        config: &InferenceConfig,
        images: Arc<dyn ImageSource>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        let soil = SoilClassifier::from_config(&config.soil_model)?;
        let crop = CropClassifier::from_config(&config.crop_model)?;
        let relationships = RelationshipTable::load(&config.reference.relationships_path)?;

        info!(
            "Pipeline ready (soil threshold {}, crop threshold {}, pre-filter {})",
            soil.threshold(),
            crop.threshold(),
            if config.prefilter.enabled { "on" } else { "off" }
        );

        Ok(Self::new(images, soil, crop, relationships, sink)
            .with_prefilter(SoilColorPrefilter::from_config(&config.prefilter))
            .with_limits(config.limits))
    }

    /// Run the pipeline and hand the outcome to the result sink on behalf of `subject_id`.
    #[instrument(skip(self, request), fields(pot = %request.pot_name))]
    pub async fn predict(&self, subject_id: &str, request: &PredictionRequest) -> Result<PredictionResult> {
        let result = self.evaluate(request).await?;

        let record = SoilResultRecord::new(subject_id, request, &result, Utc::now());
        if let Err(e) = self.sink.append(&record).await {
            warn!("Result sink append failed: {}", e);
        }

        Ok(result)
    }

    /// The decision alone, without persistence.
    pub async fn evaluate(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let raw = request.raw_nutrients();

        // Start
        let image_bytes = self
            .images
            .fetch(&request.image_url)
            .await
            .map_err(as_classification_failure)?;
        let texture = self.classify_soil(image_bytes).await?;
        if !texture.is_soil() {
            info!("No soil detected, skipping conversion and crop model");
            return Ok(PredictionResult::no_soil(raw));
        }

        // SoilClassified
        let normalized = conversion::normalize(&raw, texture)?;
        info!(
            "{} soil: N={:.2} P={:.2} K={:.2} kg/ha, pH {}",
            texture, normalized.n, normalized.p, normalized.k, normalized.ph
        );

        // RangeChecked
        if let Some(field) = self.limits.violation(&normalized) {
            info!("{} outside the accepted range, no crop recommended", field);
            return Ok(PredictionResult::no_crop(texture, normalized));
        }

        // CropClassified
        let crop = self.classify_crop(normalized, texture).await?;
        let CropPrediction::Crop { label, .. } = &crop else {
            return Ok(PredictionResult::no_crop(texture, normalized));
        };

        let (companions, avoids) = self.relationships.lookup(label);
        info!(
            "Recommended {} ({} companions, {} to avoid)",
            label,
            companions.len(),
            avoids.len()
        );

        Ok(PredictionResult {
            soil_texture: texture,
            converted_values: normalized,
            crop,
            companions,
            avoids,
        })
    }

    async fn classify_soil(&self, image_bytes: Vec<u8>) -> Result<SoilTexture> {
        let soil = Arc::clone(&self.soil);
        let prefilter = self.prefilter.clone();

        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&image_bytes)?;
            if let Some(prefilter) = prefilter {
                if !prefilter.inspect(&image).passed {
                    info!("Image rejected by the soil pre-filter");
                    return Ok(SoilTexture::NoSoilDetected);
                }
            }
            soil.classify_image(&image)
        })
        .await
        .map_err(|e| PipelineError::ClassificationFailed(e.to_string()))?
    }

    async fn classify_crop(&self, nutrients: NormalizedNutrients, texture: SoilTexture) -> Result<CropPrediction> {
        let crop = Arc::clone(&self.crop);
        tokio::task::spawn_blocking(move || crop.classify(&nutrients, texture)).await?
    }
}

fn as_classification_failure(error: PipelineError) -> PipelineError {
    match error {
        PipelineError::ClassificationFailed(_) => error,
        other => PipelineError::ClassificationFailed(other.to_string()),
    }
}
