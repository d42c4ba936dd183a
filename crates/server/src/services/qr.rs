//! QR code rendering.
//!
//! Codes are encoded with `qrcode` and rasterized into PNGs with `image`
//! for the `/api/qr` endpoint, or handed to the PDF renderer as a module
//! matrix so prints get vector-sharp codes.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;

pub const DEFAULT_SIZE: u32 = 240;
pub const MIN_SIZE: u32 = 120;
pub const MAX_SIZE: u32 = 1000;

/// Brand dark purple, `#581c87`.
pub const DARK_PURPLE: Rgba<u8> = Rgba([0x58, 0x1c, 0x87, 0xff]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
pub const WHITE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(String),
    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid color: {0}")]
    InvalidColor(String),
}

/// Rendering options for PNG output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    /// Output width and height in pixels.
    pub size: u32,
    pub dark: Rgba<u8>,
    pub light: Rgba<u8>,
    pub ec_level: EcLevel,
    /// Quiet zone in modules.
    pub margin: u32,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            dark: DARK_PURPLE,
            light: TRANSPARENT,
            ec_level: EcLevel::H,
            margin: 1,
        }
    }
}

impl QrOptions {
    /// Stable key for caching rendered PNGs.
    #[must_use]
    pub fn cache_key(&self, data: &str) -> String {
        format!(
            "{}:{:?}:{:?}:{:?}:{}:{data}",
            self.size, self.dark.0, self.light.0, self.ec_level, self.margin
        )
    }
}

/// Clamp a requested size into the supported range.
#[must_use]
pub fn clamp_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_SIZE).clamp(MIN_SIZE, MAX_SIZE)
}

/// Parse `L`, `M`, `Q` or `H` (any case).
#[must_use]
pub fn parse_ec_level(value: &str) -> Option<EcLevel> {
    match value.trim().to_ascii_uppercase().as_str() {
        "L" => Some(EcLevel::L),
        "M" => Some(EcLevel::M),
        "Q" => Some(EcLevel::Q),
        "H" => Some(EcLevel::H),
        _ => None,
    }
}

/// Parse `RRGGBB`, `#RRGGBB`, `RRGGBBAA`, `transparent` or `white`.
///
/// # Errors
///
/// Returns `QrError::InvalidColor` for anything else.
pub fn parse_color(value: &str) -> Result<Rgba<u8>, QrError> {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "transparent" => return Ok(TRANSPARENT),
        "white" => return Ok(WHITE),
        "black" => return Ok(Rgba([0, 0, 0, 0xff])),
        _ => {}
    }

    let hex = trimmed.trim_start_matches('#');
    let bytes = hex::decode(hex).map_err(|_| QrError::InvalidColor(value.to_string()))?;
    match bytes.as_slice() {
        [r, g, b] => Ok(Rgba([*r, *g, *b, 0xff])),
        [r, g, b, a] => Ok(Rgba([*r, *g, *b, *a])),
        _ => Err(QrError::InvalidColor(value.to_string())),
    }
}

/// A square grid of QR modules, `true` for dark.
#[derive(Debug, Clone)]
pub struct QrMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Encode `data` into a module matrix.
    ///
    /// # Errors
    ///
    /// Returns `QrError::Encode` if the data does not fit in a QR code.
    pub fn encode(data: &str, ec_level: EcLevel) -> Result<Self, QrError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), ec_level)
            .map_err(|e| QrError::Encode(e.to_string()))?;
        let modules = code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();
        Ok(Self {
            width: code.width(),
            modules,
        })
    }

    /// Modules per side.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && self.modules.get(y * self.width + x).copied().unwrap_or(false)
    }

    /// Iterate over dark module coordinates.
    pub fn dark_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(|(i, _)| (i % self.width, i / self.width))
    }

    /// Rasterize to an exactly `size`-pixel square, quiet zone included.
    #[must_use]
    pub fn to_image(&self, options: &QrOptions) -> RgbaImage {
        let margin = options.margin as usize;
        let total = self.width + 2 * margin;
        let size = options.size.max(1);

        RgbaImage::from_fn(size, size, |px, py| {
            let mx = (px as usize * total) / size as usize;
            let my = (py as usize * total) / size as usize;
            let dark = mx >= margin
                && my >= margin
                && self.is_dark(mx - margin, my - margin);
            if dark { options.dark } else { options.light }
        })
    }
}

/// Render `data` as a PNG.
///
/// # Errors
///
/// Returns error if encoding the QR code or the PNG fails.
pub fn render_png(data: &str, options: &QrOptions) -> Result<Vec<u8>, QrError> {
    let matrix = QrMatrix::encode(data, options.ec_level)?;
    let image = matrix.to_image(options);

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_size() {
        assert_eq!(clamp_size(None), 240);
        assert_eq!(clamp_size(Some(10)), 120);
        assert_eq!(clamp_size(Some(5000)), 1000);
        assert_eq!(clamp_size(Some(480)), 480);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("581c87").unwrap(), DARK_PURPLE);
        assert_eq!(parse_color("#3B0066").unwrap(), Rgba([0x3b, 0x00, 0x66, 0xff]));
        assert_eq!(parse_color("transparent").unwrap(), TRANSPARENT);
        assert_eq!(parse_color("White").unwrap(), WHITE);
        assert!(parse_color("purple").is_err());
        assert!(parse_color("#12345").is_err());
    }

    #[test]
    fn test_parse_ec_level() {
        assert_eq!(parse_ec_level("h"), Some(EcLevel::H));
        assert_eq!(parse_ec_level("M"), Some(EcLevel::M));
        assert_eq!(parse_ec_level("x"), None);
    }

    #[test]
    fn test_matrix_has_finder_pattern() {
        let matrix = QrMatrix::encode("https://dash.test/h/000042", EcLevel::H).unwrap();
        assert!(matrix.width() >= 21);
        // Finder pattern corners are dark, the separator ring is light
        assert!(matrix.is_dark(0, 0));
        assert!(matrix.is_dark(6, 6));
        assert!(!matrix.is_dark(7, 7));
        assert!(matrix.dark_modules().count() > 0);
    }

    #[test]
    fn test_render_png_dimensions() {
        let options = QrOptions {
            size: 300,
            light: WHITE,
            ..QrOptions::default()
        };
        let png = render_png("https://dash.test/h/000042", &options).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 300));
        // Quiet zone corner stays light
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0), &WHITE);
    }

    #[test]
    fn test_cache_key_distinguishes_options() {
        let a = QrOptions::default();
        let b = QrOptions { size: 600, ..a };
        assert_ne!(a.cache_key("x"), b.cache_key("x"));
        assert_eq!(a.cache_key("x"), QrOptions::default().cache_key("x"));
    }
}
