//! Cheap colour/texture gate run before the soil model. Off by default: it rejects photos
//! that are clearly not soil (screenshots, sky, walls) but its thresholds are heuristic.

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::config::PrefilterConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefilterVerdict {
    pub brown_ratio: f32,
    pub mean_saturation: f32,
    pub edge_density: f32,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct SoilColorPrefilter {
    config: PrefilterConfig,
}

impl SoilColorPrefilter {
    pub fn new(config: PrefilterConfig) -> Self {
        Self { config }
    }

    /// `None` when the pre-filter is disabled.
    pub fn from_config(config: &PrefilterConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config.clone()))
    }

    pub fn inspect(&self, image: &DynamicImage) -> PrefilterVerdict {
        let size = self.config.sample_size.max(8);
        let sample = if image.width() > size || image.height() > size {
            image.thumbnail(size, size).to_rgb8()
        } else {
            image.to_rgb8()
        };

        let (brown_ratio, mean_saturation) = colour_stats(&sample);
        let edge_density = edge_density(&sample, self.config.edge_threshold);

        let passed = brown_ratio >= self.config.min_brown_ratio
            && mean_saturation <= self.config.max_mean_saturation
            && edge_density >= self.config.min_edge_density
            && edge_density <= self.config.max_edge_density;

        let verdict = PrefilterVerdict {
            brown_ratio,
            mean_saturation,
            edge_density,
            passed,
        };
        debug!(?verdict, "Soil pre-filter");
        verdict
    }
}

/// HSV of an 8-bit RGB pixel; hue in degrees, saturation and value in [0, 1].
fn hsv(rgb: [u8; 3]) -> (f32, f32, f32) {
    let [r, g, b] = rgb.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

fn is_brown(hue: f32, saturation: f32, value: f32) -> bool {
    (10.0..=50.0).contains(&hue) && (0.15..=0.85).contains(&saturation) && (0.1..=0.85).contains(&value)
}

fn colour_stats(image: &RgbImage) -> (f32, f32) {
    let total = (image.width() * image.height()).max(1) as f32;
    let mut brown = 0u32;
    let mut saturation_sum = 0.0f32;

    for pixel in image.pixels() {
        let (h, s, v) = hsv(pixel.0);
        saturation_sum += s;
        if is_brown(h, s, v) {
            brown += 1;
        }
    }

    (brown as f32 / total, saturation_sum / total)
}

fn luma(image: &RgbImage, x: u32, y: u32) -> f32 {
    let [r, g, b] = image.get_pixel(x, y).0;
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Share of interior pixels whose central-difference gradient exceeds `threshold`.
fn edge_density(image: &RgbImage, threshold: f32) -> f32 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut edges = 0u32;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = (luma(image, x + 1, y) - luma(image, x - 1, y)).abs();
            let gy = (luma(image, x, y + 1) - luma(image, x, y - 1)).abs();
            if gx + gy > threshold {
                edges += 1;
            }
        }
    }

    edges as f32 / ((width - 2) * (height - 2)) as f32
}
