//! Feature layouts for the crop classifier. Artifacts trained at different times expect
//! different rows, so the layout is a strategy chosen when the model is loaded.

use soilsense_common::{NormalizedNutrients, SoilTexture};
use tracing::{info, warn};

use crate::config::FeatureContract;
use crate::error::{PipelineError, Result};

pub trait FeatureComposer: Send + Sync {
    fn name(&self) -> &'static str;

    fn width(&self) -> usize;

    fn compose(&self, nutrients: &NormalizedNutrients, texture: SoilTexture) -> Vec<f32>;
}

/// `[N, P, K, ph]`
#[derive(Debug, Clone, Copy, Default)]
pub struct NpkPhFeatures;

impl FeatureComposer for NpkPhFeatures {
    fn name(&self) -> &'static str {
        "npk_ph"
    }

    fn width(&self) -> usize {
        4
    }

    fn compose(&self, nutrients: &NormalizedNutrients, _texture: SoilTexture) -> Vec<f32> {
        vec![
            nutrients.n as f32,
            nutrients.p as f32,
            nutrients.k as f32,
            nutrients.ph as f32,
        ]
    }
}

/// `[N, P, K, ph, clay, loamy, sandy, silt]` with the texture one-hot encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpkPhTextureFeatures;

impl FeatureComposer for NpkPhTextureFeatures {
    fn name(&self) -> &'static str {
        "npk_ph_texture"
    }

    fn width(&self) -> usize {
        4 + SoilTexture::KNOWN.len()
    }

    fn compose(&self, nutrients: &NormalizedNutrients, texture: SoilTexture) -> Vec<f32> {
        let mut row = NpkPhFeatures.compose(nutrients, texture);
        row.extend(
            SoilTexture::KNOWN
                .iter()
                .map(|known| if *known == texture { 1.0 } else { 0.0 }),
        );
        row
    }
}

/// Resolve the configured contract against the width the model declares.
pub fn composer_for(
    contract: FeatureContract,
    model_width: Option<usize>,
) -> Result<Box<dyn FeatureComposer>> {
    let composer: Box<dyn FeatureComposer> = match (contract, model_width) {
        (FeatureContract::NpkPh, _) => Box::new(NpkPhFeatures),
        (FeatureContract::NpkPhTexture, _) => Box::new(NpkPhTextureFeatures),
        (FeatureContract::Auto, Some(4)) => Box::new(NpkPhFeatures),
        (FeatureContract::Auto, Some(8)) => Box::new(NpkPhTextureFeatures),
        (FeatureContract::Auto, Some(other)) => {
            return Err(PipelineError::FeatureSchemaMismatch {
                expected: other,
                actual: NpkPhFeatures.width(),
            })
        }
        (FeatureContract::Auto, None) => {
            warn!("Crop model does not declare its input width, assuming npk_ph");
            Box::new(NpkPhFeatures)
        }
    };

    if let Some(expected) = model_width {
        if expected != composer.width() {
            return Err(PipelineError::FeatureSchemaMismatch {
                expected,
                actual: composer.width(),
            });
        }
    }

    info!("Crop features use the {} layout", composer.name());
    Ok(composer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use soilsense_common::NutrientValues;

    fn nutrients() -> NormalizedNutrients {
        NutrientValues { n: 58.65, p: 69.0, k: 151.8, ph: 4.9 }
    }

    #[test]
    fn test_four_feature_row() {
        let row = NpkPhFeatures.compose(&nutrients(), SoilTexture::Clay);
        assert_eq!(row, vec![58.65, 69.0, 151.8, 4.9]);
    }

    #[test]
    fn test_eight_feature_row_one_hot() {
        let row = NpkPhTextureFeatures.compose(&nutrients(), SoilTexture::Sandy);
        assert_eq!(row.len(), 8);
        assert_eq!(&row[4..], &[0.0, 0.0, 1.0, 0.0]);

        let row = NpkPhTextureFeatures.compose(&nutrients(), SoilTexture::Clay);
        assert_eq!(&row[4..], &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_auto_selects_by_model_width() {
        assert_eq!(composer_for(FeatureContract::Auto, Some(4)).unwrap().width(), 4);
        assert_eq!(composer_for(FeatureContract::Auto, Some(8)).unwrap().width(), 8);
        assert_eq!(composer_for(FeatureContract::Auto, None).unwrap().width(), 4);
    }

    #[test]
    fn test_explicit_contract_must_match_model() {
        assert!(matches!(
            composer_for(FeatureContract::NpkPh, Some(8)),
            Err(PipelineError::FeatureSchemaMismatch { expected: 8, actual: 4 })
        ));
        assert!(matches!(
            composer_for(FeatureContract::Auto, Some(6)),
            Err(PipelineError::FeatureSchemaMismatch { expected: 6, .. })
        ));
        assert!(composer_for(FeatureContract::NpkPhTexture, None).is_ok());
    }
}
