use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::utils::{image_name_from_url, validate_url};

/// Label reported when no crop can be recommended.
pub const NO_CROP: &str = "no_crop";

/// Physical soil category as seen by the image classifier.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoilTexture {
    Sandy,
    Loamy,
    Clay,
    Silt,
    #[serde(rename = "No soil detected")]
    NoSoilDetected,
}

impl SoilTexture {
    /// The real textures, in alphabetical order. One-hot feature layouts follow this order.
    pub const KNOWN: [SoilTexture; 4] = [
        SoilTexture::Clay,
        SoilTexture::Loamy,
        SoilTexture::Sandy,
        SoilTexture::Silt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoilTexture::Sandy => "Sandy",
            SoilTexture::Loamy => "Loamy",
            SoilTexture::Clay => "Clay",
            SoilTexture::Silt => "Silt",
            SoilTexture::NoSoilDetected => "No soil detected",
        }
    }

    pub fn is_soil(&self) -> bool {
        !matches!(self, SoilTexture::NoSoilDetected)
    }
}

impl fmt::Display for SoilTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown soil texture: {0}")]
pub struct ParseTextureError(pub String);

impl FromStr for SoilTexture {
    type Err = ParseTextureError;

    /// Case-insensitive; only the four real textures parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandy" => Ok(SoilTexture::Sandy),
            "loamy" => Ok(SoilTexture::Loamy),
            "clay" => Ok(SoilTexture::Clay),
            "silt" => Ok(SoilTexture::Silt),
            _ => Err(ParseTextureError(s.to_string())),
        }
    }
}

/// N, P, K and pH. Units depend on the stage: mg/kg as measured, kg/ha after conversion.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct NutrientValues {
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
    pub ph: f64,
}

/// Nutrients in kg/ha, pH unchanged.
pub type NormalizedNutrients = NutrientValues;

#[derive(Debug, Clone, PartialEq)]
pub enum CropPrediction {
    Crop { label: String, confidence: f32 },
    NoCrop,
}

impl CropPrediction {
    pub fn label(&self) -> &str {
        match self {
            CropPrediction::Crop { label, .. } => label,
            CropPrediction::NoCrop => NO_CROP,
        }
    }

    /// Absent for `NoCrop`, whatever the classifier computed.
    pub fn confidence(&self) -> Option<f32> {
        match self {
            CropPrediction::Crop { confidence, .. } => Some(*confidence),
            CropPrediction::NoCrop => None,
        }
    }

    pub fn is_crop(&self) -> bool {
        matches!(self, CropPrediction::Crop { .. })
    }
}

fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    validate_url(url).map_err(|_| ValidationError::new("image_url_scheme"))
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct PredictionRequest {
    #[serde(rename = "imageUrl", alias = "image_url")]
    #[validate(custom = "validate_image_url")]
    pub image_url: String,

    #[serde(default)]
    pub image_name: Option<String>,

    #[serde(rename = "N")]
    pub n: f64,

    #[serde(rename = "P")]
    pub p: f64,

    #[serde(rename = "K")]
    pub k: f64,

    pub ph: f64,

    #[validate(length(min = 1))]
    pub pot_name: String,
}

impl PredictionRequest {
    pub fn raw_nutrients(&self) -> NutrientValues {
        NutrientValues {
            n: self.n,
            p: self.p,
            k: self.k,
            ph: self.ph,
        }
    }

    /// Client-supplied name, or the last segment of the image URL.
    pub fn resolved_image_name(&self) -> String {
        match &self.image_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => image_name_from_url(&self.image_url),
        }
    }
}

/// Outcome of one pipeline run. Built once, never mutated.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(into = "PredictionResponse")]
pub struct PredictionResult {
    pub soil_texture: SoilTexture,
    pub converted_values: NutrientValues,
    pub crop: CropPrediction,
    pub companions: Vec<String>,
    pub avoids: Vec<String>,
}

impl PredictionResult {
    /// Soil was not recognised: raw readings are echoed back unconverted.
    pub fn no_soil(raw: NutrientValues) -> Self {
        Self {
            soil_texture: SoilTexture::NoSoilDetected,
            converted_values: raw,
            crop: CropPrediction::NoCrop,
            companions: Vec::new(),
            avoids: Vec::new(),
        }
    }

    pub fn no_crop(soil_texture: SoilTexture, converted_values: NormalizedNutrients) -> Self {
        Self {
            soil_texture,
            converted_values,
            crop: CropPrediction::NoCrop,
            companions: Vec::new(),
            avoids: Vec::new(),
        }
    }
}

/// Wire shape of a prediction.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub soil_texture: String,
    pub recommended_crop: String,
    pub companions: Vec<String>,
    pub avoid: Vec<String>,
    pub confidence: Option<f32>,
    pub converted_values: NutrientValues,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            soil_texture: result.soil_texture.to_string(),
            recommended_crop: result.crop.label().to_string(),
            confidence: result.crop.confidence(),
            companions: result.companions,
            avoid: result.avoids,
            converted_values: result.converted_values,
        }
    }
}

/// Row appended to the results store for every completed prediction.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SoilResultRecord {
    pub user_id: String,
    pub pot_name: String,
    pub image_name: String,
    pub image_url: String,
    pub prediction: String,
    pub recommended_crop: String,
    pub confidence: Option<f32>,
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub ph_level: f64,
    pub companions: Vec<String>,
    pub avoids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SoilResultRecord {
    /// Nutrients are stored as measured, not converted.
    pub fn new(
        subject_id: &str,
        request: &PredictionRequest,
        result: &PredictionResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: subject_id.to_string(),
            pot_name: request.pot_name.clone(),
            image_name: request.resolved_image_name(),
            image_url: request.image_url.clone(),
            prediction: result.soil_texture.to_string(),
            recommended_crop: result.crop.label().to_string(),
            confidence: result.crop.confidence(),
            n: request.n,
            p: request.p,
            k: request.k,
            ph_level: request.ph,
            companions: result.companions.clone(),
            avoids: result.avoids.clone(),
            created_at,
        }
    }
}
