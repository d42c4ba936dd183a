//! Acrylic keepsake preview image.
//!
//! Composes the tribute photo and its QR code onto a mantel scene as a PNG,
//! so the gift page and order emails can show what the block will look like.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use thiserror::Error;
use tracing::warn;

use crate::services::qr::{QrError, QrMatrix, QrOptions, WHITE};

pub const WIDTH: u32 = 1200;
pub const HEIGHT: u32 = 900;

/// The acrylic block, a square standing on the mantel.
const BLOCK_SIZE: u32 = 600;
const BLOCK_X: u32 = (WIDTH - BLOCK_SIZE) / 2;
const BLOCK_Y: u32 = 140;
const BLOCK_BORDER: u32 = 12;
/// Top of the mantel shelf.
const MANTEL_Y: u32 = BLOCK_Y + BLOCK_SIZE;
const QR_SIZE: u32 = 110;
const QR_INSET: u32 = 24;

const WALL: Rgba<u8> = Rgba([0xf5, 0xef, 0xe6, 0xff]);
const MANTEL: Rgba<u8> = Rgba([0x6b, 0x4f, 0x3a, 0xff]);
const GLASS: Rgba<u8> = Rgba([0xfb, 0xfb, 0xfd, 0xff]);
const QR_DARK: Rgba<u8> = Rgba([0, 0, 0, 0xff]);

#[derive(Debug, Error)]
pub enum MockupError {
    #[error(transparent)]
    Qr(#[from] QrError),
    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Inputs for one preview.
#[derive(Debug, Clone)]
pub struct MockupContent {
    /// Encoded photo; an undecodable one is left out.
    pub photo: Option<Vec<u8>>,
    pub qr_target: String,
    pub accent: Rgba<u8>,
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    for py in y..(y + h).min(canvas.height()) {
        for px in x..(x + w).min(canvas.width()) {
            canvas.put_pixel(px, py, color);
        }
    }
}

/// Scale `photo` to fit a `max`-pixel square, preserving aspect.
fn fitted_photo(bytes: &[u8], max: u32) -> Option<RgbaImage> {
    match image::load_from_memory(bytes) {
        Ok(photo) => Some(photo.resize(max, max, FilterType::Triangle).to_rgba8()),
        Err(e) => {
            warn!(error = %e, "Photo could not be decoded for mockup");
            None
        }
    }
}

/// Render the preview as a PNG.
///
/// # Errors
///
/// Returns `MockupError` if the QR target cannot be encoded or the PNG
/// cannot be written.
pub fn render(content: &MockupContent) -> Result<Vec<u8>, MockupError> {
    let mut canvas = RgbaImage::from_pixel(WIDTH, HEIGHT, WALL);
    fill_rect(&mut canvas, 0, MANTEL_Y, WIDTH, HEIGHT - MANTEL_Y, MANTEL);

    fill_rect(&mut canvas, BLOCK_X, BLOCK_Y, BLOCK_SIZE, BLOCK_SIZE, content.accent);
    let inner = BLOCK_SIZE - 2 * BLOCK_BORDER;
    let inner_x = BLOCK_X + BLOCK_BORDER;
    let inner_y = BLOCK_Y + BLOCK_BORDER;
    fill_rect(&mut canvas, inner_x, inner_y, inner, inner, GLASS);

    if let Some(photo) = content.photo.as_deref().and_then(|b| fitted_photo(b, inner)) {
        let x = inner_x + (inner - photo.width()) / 2;
        let y = inner_y + (inner - photo.height()) / 2;
        imageops::overlay(&mut canvas, &photo, i64::from(x), i64::from(y));
    }

    let qr = QrMatrix::encode(&content.qr_target, qrcode::EcLevel::H)?.to_image(&QrOptions {
        size: QR_SIZE,
        dark: QR_DARK,
        light: WHITE,
        margin: 2,
        ..QrOptions::default()
    });
    imageops::overlay(
        &mut canvas,
        &qr,
        i64::from(inner_x + QR_INSET),
        i64::from(inner_y + inner - QR_SIZE - QR_INSET),
    );

    let mut png = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Object path for a slug's preview.
#[must_use]
pub fn object_path(slug: &str) -> String {
    format!("mockups/{slug}.png")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .unwrap();
        out
    }

    fn content(photo: Option<Vec<u8>>) -> MockupContent {
        MockupContent {
            photo,
            qr_target: "https://dash.test/h/000042".into(),
            accent: Rgba([0xaa, 0x33, 0x66, 0xff]),
        }
    }

    #[test]
    fn test_renders_scene_with_photo() {
        let png = render(&content(Some(jpeg(300, 150)))).unwrap();
        let image = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (WIDTH, HEIGHT));

        // Accent border, wall and mantel.
        assert_eq!(*image.get_pixel(BLOCK_X + 2, BLOCK_Y + 2), Rgba([0xaa, 0x33, 0x66, 0xff]));
        assert_eq!(*image.get_pixel(5, 5), WALL);
        assert_eq!(*image.get_pixel(5, HEIGHT - 5), MANTEL);

        // A wide photo is centered and letterboxed on the glass.
        let center = image.get_pixel(WIDTH / 2, BLOCK_Y + BLOCK_SIZE / 2);
        assert!(center[0] > 150 && center[1] < 80);
        assert_eq!(*image.get_pixel(WIDTH / 2, BLOCK_Y + BLOCK_BORDER + 4), GLASS);
    }

    #[test]
    fn test_corrupt_photo_is_left_out() {
        let png = render(&content(Some(b"not an image".to_vec()))).unwrap();
        let image = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(WIDTH / 2, BLOCK_Y + BLOCK_SIZE / 2), GLASS);
    }

    #[test]
    fn test_object_path() {
        assert_eq!(object_path("000042"), "mockups/000042.png");
    }
}
