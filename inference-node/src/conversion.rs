//! mg/kg to kg/ha conversion for a 30 cm sampling layer.

use soilsense_common::{NormalizedNutrients, NutrientValues, SoilTexture};

use crate::error::{PipelineError, Result};

pub const SAMPLING_DEPTH_CM: f64 = 30.0;

/// cm depth * g/cm3 to kg of soil per hectare.
const UNIT_SCALE: f64 = 1e5;

/// g/cm3 for each real texture; `None` for the sentinel.
pub fn bulk_density(texture: SoilTexture) -> Option<f64> {
    match texture {
        SoilTexture::Sandy => Some(1.6),
        SoilTexture::Loamy => Some(1.3),
        SoilTexture::Clay => Some(1.15),
        SoilTexture::Silt => Some(1.25),
        SoilTexture::NoSoilDetected => None,
    }
}

/// Multiplier applied to every mg/kg reading.
pub fn conversion_factor(texture: SoilTexture) -> Result<f64> {
    let density = bulk_density(texture)
        .ok_or_else(|| PipelineError::InvalidSoilType(texture.to_string()))?;
    let soil_mass = density * SAMPLING_DEPTH_CM * UNIT_SCALE;
    Ok(soil_mass / 1e6)
}

pub fn convert(n_raw: f64, p_raw: f64, k_raw: f64, texture: SoilTexture) -> Result<(f64, f64, f64)> {
    let factor = conversion_factor(texture)?;
    Ok((n_raw * factor, p_raw * factor, k_raw * factor))
}

/// Same as [`convert`], keyed by texture name (case-insensitive).
pub fn convert_named(n_raw: f64, p_raw: f64, k_raw: f64, texture: &str) -> Result<(f64, f64, f64)> {
    let texture = texture
        .parse::<SoilTexture>()
        .map_err(|_| PipelineError::InvalidSoilType(texture.to_string()))?;
    convert(n_raw, p_raw, k_raw, texture)
}

pub fn normalize(raw: &NutrientValues, texture: SoilTexture) -> Result<NormalizedNutrients> {
    let (n, p, k) = convert(raw.n, raw.p, raw.k, texture)?;
    Ok(NutrientValues { n, p, k, ph: raw.ph })
}
