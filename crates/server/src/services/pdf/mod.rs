//! Print-ready PDF rendering.
//!
//! Every artifact is a single page at 72 pt/in. Cards and posters carry a
//! 0.125 in bleed around the trim box and keep text inside a 0.25 in safe
//! margin; the acrylic keepsake is an exact 6 in square.
//!
//! QR codes are drawn as vector modules, photos are embedded as RGB image
//! XObjects. Rendering is CPU-bound; async callers should run it on the
//! blocking pool.

mod canvas;
mod fonts;
mod layouts;

use dash_memories_core::PrintFormat;
use image::DynamicImage;
use image::imageops::FilterType;
use thiserror::Error;

pub use canvas::{Canvas, Rgb};
pub use fonts::{Font, wrap_text};
pub use layouts::{PASSAGES, Passage, format_short_month};

use crate::services::qr::QrError;

/// Points per inch.
pub const DPI: f32 = 72.0;
/// Bleed added on every side of cards and posters.
pub const BLEED: f32 = 0.125 * DPI;
/// Margin inside the trim edge that text stays within.
pub const SAFE: f32 = 0.25 * DPI;

/// Longest edge, in pixels, of an embedded photo.
const MAX_PHOTO_PX: u32 = 3000;

/// Counselor shown on the card back when none is given.
pub const DEFAULT_COUNSELOR_NAME: &str = "Groman Mortuary";
pub const DEFAULT_COUNSELOR_PHONE: &str = "323-476-8005";

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("could not decode photo: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Qr(#[from] QrError),

    #[error("failed to write PDF: {0}")]
    Write(String),
}

/// Everything a print layout may draw.
#[derive(Debug, Clone, Default)]
pub struct PrintContent {
    /// Encoded tribute photo (JPEG, PNG or WebP).
    pub photo: Option<Vec<u8>>,
    /// Encoded background for the card back.
    pub background: Option<Vec<u8>>,
    /// URL the QR code points at.
    pub qr_target: String,
    pub full_name: String,
    pub birth_date: String,
    pub death_date: String,
    pub counselor_name: Option<String>,
    pub counselor_phone: Option<String>,
    pub passage_index: usize,
}

impl PrintContent {
    fn counselor_line(&self) -> String {
        let name = self
            .counselor_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_COUNSELOR_NAME);
        let phone = self
            .counselor_phone
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_COUNSELOR_PHONE);
        format!("{name} \u{2022} {phone}")
    }
}

/// Render `format` for `content`.
///
/// # Errors
///
/// Returns error if the photo cannot be decoded (cards and posters only),
/// the QR code cannot be encoded, or the PDF cannot be serialized. The
/// acrylic layout omits a broken photo or QR instead of failing.
pub fn render(format: PrintFormat, content: &PrintContent) -> Result<Vec<u8>, PdfError> {
    match format {
        PrintFormat::CardFront => layouts::card_front(content),
        PrintFormat::CardBack => layouts::card_back(content),
        PrintFormat::Poster => layouts::poster(content),
        PrintFormat::Acrylic => layouts::acrylic(content),
    }
}

/// Page size in points for `format`, bleed included.
#[must_use]
pub fn page_size(format: PrintFormat) -> (f32, f32) {
    let (w, h) = format.trim_inches();
    let bleed = if format.has_bleed() { BLEED * 2.0 } else { 0.0 };
    (w * DPI + bleed, h * DPI + bleed)
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, PdfError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Crop `image` to the aspect of a `w` x `h` box and cap its resolution.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cover(image: &DynamicImage, w: f32, h: f32) -> image::RgbImage {
    let (iw, ih) = (image.width() as f32, image.height() as f32);
    let target = w / h;
    let (cw, ch) = if iw / ih > target {
        (ih * target, ih)
    } else {
        (iw, iw / target)
    };
    let x = ((iw - cw) / 2.0).max(0.0) as u32;
    let y = ((ih - ch) / 2.0).max(0.0) as u32;
    let cropped = image.crop_imm(x, y, (cw as u32).max(1), (ch as u32).max(1));
    downscale(&cropped).to_rgb8()
}

fn downscale(image: &DynamicImage) -> DynamicImage {
    if image.width().max(image.height()) > MAX_PHOTO_PX {
        image.resize(MAX_PHOTO_PX, MAX_PHOTO_PX, FilterType::Lanczos3)
    } else {
        image.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb as Pixel, RgbImage};
    use lopdf::Document;

    use super::*;

    pub(crate) fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Pixel([u8::try_from(x % 256).unwrap(), u8::try_from(y % 256).unwrap(), 120])
        });
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .unwrap();
        out
    }

    fn content(photo: Option<Vec<u8>>) -> PrintContent {
        PrintContent {
            photo,
            qr_target: "https://dash.test/h/000042".into(),
            full_name: "Eleanor Grace Whitfield".into(),
            birth_date: "March 3, 1941".into(),
            death_date: "June 9, 2025".into(),
            ..PrintContent::default()
        }
    }

    fn media_box(bytes: &[u8]) -> Vec<f32> {
        let doc = Document::load_mem(bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let catalog = doc.catalog().unwrap();
        let pages_ref = catalog.get(b"Pages").unwrap().as_reference().unwrap();
        let pages_dict = doc.get_dictionary(pages_ref).unwrap();
        pages_dict
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    }

    #[test]
    fn test_page_sizes() {
        assert_eq!(page_size(PrintFormat::CardFront), (306.0, 450.0));
        assert_eq!(page_size(PrintFormat::Poster), (1458.0, 2178.0));
        assert_eq!(page_size(PrintFormat::Acrylic), (432.0, 432.0));
    }

    #[test]
    fn test_every_format_renders() {
        let photo = jpeg(120, 160);
        for format in [
            PrintFormat::CardFront,
            PrintFormat::CardBack,
            PrintFormat::Poster,
            PrintFormat::Acrylic,
        ] {
            let bytes = render(format, &content(Some(photo.clone()))).unwrap();
            assert!(bytes.starts_with(b"%PDF"), "{format}");
            let (w, h) = page_size(format);
            assert_eq!(media_box(&bytes), vec![0.0, 0.0, w, h], "{format}");
        }
    }

    #[test]
    fn test_card_front_without_photo() {
        let bytes = render(PrintFormat::CardFront, &content(None)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_card_front_rejects_corrupt_photo() {
        let result = render(PrintFormat::CardFront, &content(Some(b"nope".to_vec())));
        assert!(matches!(result, Err(PdfError::Image(_))));
    }

    #[test]
    fn test_acrylic_degrades_on_corrupt_photo() {
        let bytes = render(PrintFormat::Acrylic, &content(Some(b"nope".to_vec()))).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_cover_matches_box_aspect() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(400, 100));
        let covered = cover(&image, 100.0, 100.0);
        assert_eq!((covered.width(), covered.height()), (100, 100));
    }

    #[test]
    fn test_counselor_defaults() {
        let mut c = content(None);
        assert_eq!(c.counselor_line(), "Groman Mortuary \u{2022} 323-476-8005");
        c.counselor_name = Some("Rose Hills".into());
        c.counselor_phone = Some("  ".into());
        assert_eq!(c.counselor_line(), "Rose Hills \u{2022} 323-476-8005");
    }
}
