//! Accent color extraction from tribute photos.
//!
//! Builds a coarse color histogram of a thumbnail and picks the best swatch
//! for each palette target (vibrant, light vibrant, muted, dark vibrant,
//! dark muted, light muted), returning the first target that any color fits.

use std::collections::HashMap;

use image::imageops::FilterType;
use thiserror::Error;

/// Fallback when no swatch can be found.
pub const DEFAULT_ACCENT: &str = "#ffffff";

const THUMBNAIL_SIZE: u32 = 64;
/// Bits kept per channel when bucketing colors.
const QUANT_BITS: u8 = 5;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no opaque pixels")]
    Empty,
}

/// A palette target in HSL space.
#[derive(Debug, Clone, Copy)]
struct Target {
    min_luma: f32,
    target_luma: f32,
    max_luma: f32,
    min_sat: f32,
    target_sat: f32,
    max_sat: f32,
}

const VIBRANT: Target = Target {
    min_luma: 0.3,
    target_luma: 0.5,
    max_luma: 0.7,
    min_sat: 0.35,
    target_sat: 1.0,
    max_sat: 1.0,
};
const LIGHT_VIBRANT: Target = Target {
    min_luma: 0.55,
    target_luma: 0.74,
    max_luma: 1.0,
    ..VIBRANT
};
const DARK_VIBRANT: Target = Target {
    min_luma: 0.0,
    target_luma: 0.26,
    max_luma: 0.45,
    ..VIBRANT
};
const MUTED: Target = Target {
    min_sat: 0.0,
    target_sat: 0.3,
    max_sat: 0.4,
    ..VIBRANT
};
const LIGHT_MUTED: Target = Target {
    min_sat: 0.0,
    target_sat: 0.3,
    max_sat: 0.4,
    ..LIGHT_VIBRANT
};
const DARK_MUTED: Target = Target {
    min_sat: 0.0,
    target_sat: 0.3,
    max_sat: 0.4,
    ..DARK_VIBRANT
};

/// Accent preference order.
const ACCENT_ORDER: [Target; 6] = [
    VIBRANT,
    LIGHT_VIBRANT,
    MUTED,
    DARK_VIBRANT,
    DARK_MUTED,
    LIGHT_MUTED,
];

#[derive(Debug, Clone, Copy)]
struct Swatch {
    rgb: [u8; 3],
    population: u32,
    saturation: f32,
    luma: f32,
}

/// Pick an accent color (`#rrggbb`) for an encoded image.
///
/// # Errors
///
/// Returns error if the image cannot be decoded or is fully transparent.
pub fn accent_color(bytes: &[u8]) -> Result<String, ColorError> {
    let swatches = histogram(bytes)?;
    let max_population = swatches.iter().map(|s| s.population).max().unwrap_or(1);

    let picked = ACCENT_ORDER
        .iter()
        .find_map(|target| best_for(target, &swatches, max_population))
        .map_or_else(|| DEFAULT_ACCENT.to_string(), |s| to_hex(s.rgb));
    Ok(picked)
}

/// Like [`accent_color`] but never fails.
#[must_use]
pub fn accent_color_or_default(bytes: &[u8]) -> String {
    accent_color(bytes).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to calculate accent color");
        DEFAULT_ACCENT.to_string()
    })
}

fn histogram(bytes: &[u8]) -> Result<Vec<Swatch>, ColorError> {
    let image = image::load_from_memory(bytes)?
        .resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle)
        .to_rgba8();

    let shift = 8 - QUANT_BITS;
    let mut buckets: HashMap<[u8; 3], ([u64; 3], u32)> = HashMap::new();
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < 125 {
            continue;
        }
        let entry = buckets
            .entry([r >> shift, g >> shift, b >> shift])
            .or_insert(([0; 3], 0));
        entry.0[0] += u64::from(r);
        entry.0[1] += u64::from(g);
        entry.0[2] += u64::from(b);
        entry.1 += 1;
    }

    if buckets.is_empty() {
        return Err(ColorError::Empty);
    }

    Ok(buckets
        .into_values()
        .map(|(sums, count)| {
            let avg = |sum: u64| u8::try_from(sum / u64::from(count)).unwrap_or(u8::MAX);
            let rgb = [avg(sums[0]), avg(sums[1]), avg(sums[2])];
            let (saturation, luma) = saturation_lightness(rgb);
            Swatch {
                rgb,
                population: count,
                saturation,
                luma,
            }
        })
        .collect())
}

fn best_for(target: &Target, swatches: &[Swatch], max_population: u32) -> Option<Swatch> {
    swatches
        .iter()
        .filter(|s| {
            (target.min_sat..=target.max_sat).contains(&s.saturation)
                && (target.min_luma..=target.max_luma).contains(&s.luma)
        })
        .map(|s| (score(target, s, max_population), *s))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, s)| s)
}

#[allow(clippy::cast_precision_loss)]
fn score(target: &Target, swatch: &Swatch, max_population: u32) -> f32 {
    let sat = 1.0 - (swatch.saturation - target.target_sat).abs();
    let luma = 1.0 - (swatch.luma - target.target_luma).abs();
    let population = swatch.population as f32 / max_population.max(1) as f32;
    sat * 3.0 + luma * 6.0 + population
}

/// HSL saturation and lightness in `0.0..=1.0`.
fn saturation_lightness([r, g, b]: [u8; 3]) -> (f32, f32) {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let delta = max - min;
    if delta <= f32::EPSILON {
        return (0.0, lightness);
    }
    let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs());
    (saturation.clamp(0.0, 1.0), lightness)
}

fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn test_saturated_photo_yields_vibrant_accent() {
        // Mostly gray with a strong red block
        let image = RgbImage::from_fn(80, 80, |x, _| {
            if x < 30 { Rgb([220, 30, 30]) } else { Rgb([128, 128, 128]) }
        });
        let accent = accent_color(&png(&image)).unwrap();
        assert!(accent.starts_with("#d") || accent.starts_with("#e"), "got {accent}");
    }

    #[test]
    fn test_gray_photo_yields_muted_accent() {
        let image = RgbImage::from_pixel(40, 40, Rgb([120, 110, 100]));
        let accent = accent_color(&png(&image)).unwrap();
        assert_eq!(accent.len(), 7);
        assert_ne!(accent, DEFAULT_ACCENT);
    }

    #[test]
    fn test_undecodable_bytes_fall_back() {
        assert!(accent_color(b"not an image").is_err());
        assert_eq!(accent_color_or_default(b"not an image"), DEFAULT_ACCENT);
    }

    #[test]
    fn test_saturation_lightness() {
        let (s, l) = saturation_lightness([255, 0, 0]);
        assert!((s - 1.0).abs() < 1e-4 && (l - 0.5).abs() < 1e-4);
        let (s, l) = saturation_lightness([128, 128, 128]);
        assert!(s.abs() < 1e-4 && (l - 0.502).abs() < 1e-2);
    }
}
