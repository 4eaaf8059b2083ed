//! Model seams. The adapters only see these traits, so any backend (or a test double)
//! can stand in for the ONNX sessions.

use image::DynamicImage;

use crate::error::Result;

pub mod crop_classifier;
pub mod features;
pub mod labels;
pub mod ort_engine;
pub mod soil_classifier;

pub use crop_classifier::CropClassifier;
pub use features::{FeatureComposer, NpkPhFeatures, NpkPhTextureFeatures};
pub use labels::LabelIndex;
pub use soil_classifier::{LabelNormalizer, SoilClassifier};

/// Image classifier producing one probability per class.
///
/// Implementations must tolerate concurrent calls.
pub trait ImageModel: Send + Sync {
    /// `Ok(None)` when the model produced no class-probability output.
    fn predict(&self, image: &DynamicImage) -> Result<Option<Vec<f32>>>;
}

/// Tabular classifier over a flat feature row.
pub trait TabularModel: Send + Sync {
    /// Declared width of the input row, when the artifact states one.
    fn input_width(&self) -> Option<usize>;

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;
}

/// Index and value of the largest probability. NaNs never win.
pub fn arg_max(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((idx, p)),
        })
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
