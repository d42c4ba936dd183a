//! Single-page PDF drawing surface on top of `lopdf`.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner.

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat, dictionary};

use super::PdfError;
use super::fonts::{Font, win_ansi};
use crate::services::qr::QrMatrix;

/// Fill color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const WHITE: Self = Self(1.0, 1.0, 1.0);
    pub const BLACK: Self = Self(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn gray(level: f32) -> Self {
        Self(level, level, level)
    }

    /// From 8-bit channels.
    #[must_use]
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self(f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0)
    }
}

/// Accumulates drawing operations and resources for one page.
pub struct Canvas {
    width: f32,
    height: f32,
    ops: Vec<Operation>,
    images: Vec<Stream>,
    alphas: Vec<f32>,
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

impl Canvas {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            images: Vec::new(),
            alphas: Vec::new(),
        }
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// Fill a rectangle.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb) {
        self.set_fill(color);
        self.ops.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        self.ops.push(Operation::new("f", vec![]));
    }

    /// Fill a rectangle at the given opacity.
    pub fn fill_rect_alpha(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgb, opacity: f32) {
        let state = self.alpha_state(opacity);
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("gs", vec![name(&state)]));
        self.fill_rect(x, y, w, h, color);
        self.ops.push(Operation::new("Q", vec![]));
    }

    /// Draw `image` stretched into the given box.
    pub fn image(&mut self, image: &RgbImage, x: f32, y: f32, w: f32, h: f32) {
        let resource = format!("Im{}", self.images.len());
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width()),
                "Height" => i64::from(image.height()),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            image.as_raw().clone(),
        );
        self.images.push(stream);

        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
        ));
        self.ops.push(Operation::new("Do", vec![name(&resource)]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    /// Draw a single line of text with its baseline at `y`.
    pub fn text(&mut self, text: &str, font: Font, size: f32, x: f32, y: f32, color: Rgb) {
        self.set_fill(color);
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![name(font.resource_name()), size.into()],
        ));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Draw text centered horizontally within `[left, left + width]`.
    #[allow(clippy::too_many_arguments)]
    pub fn text_centered(
        &mut self,
        text: &str,
        font: Font,
        size: f32,
        left: f32,
        width: f32,
        y: f32,
        color: Rgb,
    ) {
        let x = left + (width - font.width_of(text, size)) / 2.0;
        self.text(text, font, size, x, y, color);
    }

    /// Draw a QR code as vector modules in a `size` square at `(x, y)`.
    ///
    /// `margin` is the quiet zone in modules; `light` fills the whole square
    /// first when given.
    #[allow(clippy::cast_precision_loss, clippy::too_many_arguments)]
    pub fn qr(
        &mut self,
        matrix: &QrMatrix,
        x: f32,
        y: f32,
        size: f32,
        margin: usize,
        dark: Rgb,
        light: Option<Rgb>,
    ) {
        if let Some(light) = light {
            self.fill_rect(x, y, size, size, light);
        }
        let total = (matrix.width() + 2 * margin) as f32;
        let module = size / total;

        self.set_fill(dark);
        for (mx, my) in matrix.dark_modules() {
            let left = x + (mx + margin) as f32 * module;
            // Matrix rows run top-down
            let bottom = y + size - (my + margin + 1) as f32 * module;
            // Slight overlap hides hairline seams between modules
            self.ops.push(Operation::new(
                "re",
                vec![
                    left.into(),
                    bottom.into(),
                    (module + 0.01).into(),
                    (module + 0.01).into(),
                ],
            ));
        }
        self.ops.push(Operation::new("f", vec![]));
    }

    /// Serialize the page into a compressed PDF document.
    ///
    /// # Errors
    ///
    /// Returns `PdfError::Write` if the content stream or document cannot be
    /// encoded.
    pub fn finish(self) -> Result<Vec<u8>, PdfError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in [Font::Helvetica, Font::HelveticaBold] {
            fonts.set(
                font.resource_name(),
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => font.base_font(),
                    "Encoding" => "WinAnsiEncoding",
                },
            );
        }

        let mut xobjects = Dictionary::new();
        for (index, stream) in self.images.into_iter().enumerate() {
            let id = doc.add_object(stream);
            xobjects.set(format!("Im{index}"), id);
        }

        let mut states = Dictionary::new();
        for (index, alpha) in self.alphas.iter().enumerate() {
            states.set(
                format!("GS{index}"),
                dictionary! {
                    "Type" => "ExtGState",
                    "ca" => *alpha,
                    "CA" => *alpha,
                },
            );
        }

        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => xobjects,
            "ExtGState" => states,
        });

        let content = Content {
            operations: self.ops,
        };
        let encoded = content
            .encode()
            .map_err(|e| PdfError::Write(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), self.width.into(), self.height.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| PdfError::Write(e.to_string()))?;
        Ok(out)
    }

    fn set_fill(&mut self, Rgb(r, g, b): Rgb) {
        self.ops
            .push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    }

    fn alpha_state(&mut self, opacity: f32) -> String {
        let index = self
            .alphas
            .iter()
            .position(|a| (a - opacity).abs() < f32::EPSILON)
            .unwrap_or_else(|| {
                self.alphas.push(opacity);
                self.alphas.len() - 1
            });
        format!("GS{index}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_produces_pdf() {
        let mut canvas = Canvas::new(288.0, 432.0);
        canvas.fill_rect(0.0, 0.0, 288.0, 432.0, Rgb::gray(0.2));
        canvas.fill_rect_alpha(0.0, 0.0, 288.0, 432.0, Rgb::BLACK, 0.35);
        canvas.text_centered("In Loving Memory", Font::HelveticaBold, 11.0, 0.0, 288.0, 200.0, Rgb::WHITE);
        canvas.image(&RgbImage::new(4, 4), 10.0, 10.0, 40.0, 40.0);

        let bytes = canvas.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_alpha_states_are_shared() {
        let mut canvas = Canvas::new(10.0, 10.0);
        canvas.fill_rect_alpha(0.0, 0.0, 1.0, 1.0, Rgb::BLACK, 0.35);
        canvas.fill_rect_alpha(0.0, 0.0, 1.0, 1.0, Rgb::WHITE, 0.35);
        canvas.fill_rect_alpha(0.0, 0.0, 1.0, 1.0, Rgb::WHITE, 0.55);
        assert_eq!(canvas.alphas.len(), 2);
    }
}
