//! The four print layouts.

use dash_memories_core::PrintFormat;
use qrcode::EcLevel;
use tracing::warn;

use super::canvas::{Canvas, Rgb};
use super::fonts::{Font, wrap_text};
use super::{BLEED, DPI, PdfError, PrintContent, SAFE, cover, decode, downscale, page_size};
use crate::services::qr::QrMatrix;

const PURPLE_900: Rgb = Rgb(0.22, 0.11, 0.35);
const PURPLE_700: Rgb = Rgb(0.25, 0.15, 0.35);
const OVERLAY_OPACITY: f32 = 0.35;
const EM_DASH: &str = "\u{2014}";

/// A passage printed on the card back.
#[derive(Debug, Clone, Copy)]
pub struct Passage {
    pub text: &'static str,
    pub credit: &'static str,
}

pub const PASSAGES: [Passage; 6] = [
    Passage {
        text: "The Lord is my shepherd; I shall not want. He maketh me to lie down in green \
               pastures: he leadeth me beside the still waters. He restoreth my soul: he \
               leadeth me in the paths of righteousness for his name's sake. Yea, though I \
               walk through the valley of the shadow of death, I will fear no evil: for thou \
               art with me; thy rod and thy staff they comfort me.",
        credit: "-Psalm 23 (KJV)",
    },
    Passage {
        text: "Come to me, all you who are weary and burdened, and I will give you rest. Take \
               my yoke upon you and learn from me, for I am gentle and humble in heart, and \
               you will find rest for your souls.",
        credit: "-Matthew 11:28-29",
    },
    Passage {
        text: "Blessed are those who mourn, for they shall be comforted. The Lord is close to \
               the brokenhearted and saves those who are crushed in spirit.",
        credit: "-Matthew 5:4; Psalm 34:18",
    },
    Passage {
        text: "Death is not extinguishing the light; it is only putting out the lamp because \
               dawn has come.",
        credit: "-Rabindranath Tagore",
    },
    Passage {
        text: "What we have once enjoyed we can never lose. All that we love deeply becomes a \
               part of us.",
        credit: "-Helen Keller",
    },
    Passage {
        text: "For God so loved the world that he gave his one and only Son, that whoever \
               believes in him shall not perish but have eternal life.",
        credit: "-John 3:16",
    },
];

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Shorten full month names to three letters. June and July stay whole.
#[must_use]
pub fn format_short_month(value: &str) -> String {
    fn flush(word: &mut String, out: &mut String) {
        let lower = word.to_lowercase();
        if MONTHS.contains(&lower.as_str()) && lower != "june" && lower != "july" {
            out.extend(word.chars().take(3));
        } else {
            out.push_str(word);
        }
        word.clear();
    }

    let mut out = String::with_capacity(value.len());
    let mut word = String::new();

    for c in value.chars() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { EM_DASH } else { value }
}

/// Trim-relative geometry for bleed layouts.
struct Frame {
    width: f32,
    height: f32,
    safe_left: f32,
    safe_bottom: f32,
    safe_w: f32,
    safe_h: f32,
}

impl Frame {
    fn new(format: PrintFormat) -> Self {
        let (width, height) = page_size(format);
        let (trim_w, trim_h) = format.trim_inches();
        Self {
            width,
            height,
            safe_left: BLEED + SAFE,
            safe_bottom: BLEED + SAFE,
            safe_w: trim_w * DPI - SAFE * 2.0,
            safe_h: trim_h * DPI - SAFE * 2.0,
        }
    }
}

/// Full-bleed photo (or a dark fill) under a translucent black overlay.
fn photo_backdrop(canvas: &mut Canvas, frame: &Frame, photo: Option<&[u8]>) -> Result<(), PdfError> {
    match photo.filter(|p| !p.is_empty()) {
        Some(bytes) => {
            let image = cover(&decode(bytes)?, frame.width, frame.height);
            canvas.image(&image, 0.0, 0.0, frame.width, frame.height);
        }
        None => canvas.fill_rect(0.0, 0.0, frame.width, frame.height, Rgb::gray(0.2)),
    }
    canvas.fill_rect_alpha(
        0.0,
        0.0,
        frame.width,
        frame.height,
        Rgb::BLACK,
        OVERLAY_OPACITY,
    );
    Ok(())
}

pub(super) fn card_front(content: &PrintContent) -> Result<Vec<u8>, PdfError> {
    let frame = Frame::new(PrintFormat::CardFront);
    let mut canvas = Canvas::new(frame.width, frame.height);
    photo_backdrop(&mut canvas, &frame, content.photo.as_deref())?;

    let base = frame.safe_bottom + 0.45 * DPI;
    let (left, width) = (frame.safe_left, frame.safe_w);
    canvas.text_centered(
        "In Loving Memory",
        Font::HelveticaBold,
        11.0,
        left,
        width,
        base + 2.2 * DPI,
        Rgb::gray(0.95),
    );
    canvas.text_centered(
        or_dash(&content.full_name),
        Font::HelveticaBold,
        14.0,
        left,
        width,
        base + 1.5 * DPI,
        Rgb::WHITE,
    );
    let dates = format!(
        "{} \u{2013} {}",
        or_dash(&content.birth_date),
        or_dash(&content.death_date)
    );
    canvas.text_centered(
        &dates,
        Font::Helvetica,
        8.0,
        left,
        width,
        base + 0.5 * DPI,
        Rgb::gray(0.9),
    );

    canvas.finish()
}

pub(super) fn card_back(content: &PrintContent) -> Result<Vec<u8>, PdfError> {
    let frame = Frame::new(PrintFormat::CardBack);
    let mut canvas = Canvas::new(frame.width, frame.height);

    match content.background.as_deref().filter(|b| !b.is_empty()) {
        Some(bytes) => {
            let image = cover(&decode(bytes)?, frame.width, frame.height);
            canvas.image(&image, 0.0, 0.0, frame.width, frame.height);
        }
        None => canvas.fill_rect(0.0, 0.0, frame.width, frame.height, Rgb(0.4, 0.6, 0.9)),
    }
    canvas.fill_rect_alpha(0.0, 0.0, frame.width, frame.height, Rgb::WHITE, 0.55);

    let pad = 0.1 * DPI;
    let (left, safe_w) = (frame.safe_left, frame.safe_w);
    let top = frame.safe_bottom + frame.safe_h;

    canvas.text(
        "Forever in Our Hearts",
        Font::HelveticaBold,
        10.0,
        left + pad,
        top - pad - 0.25 * DPI,
        PURPLE_900,
    );

    // Out-of-range indexes use the last passage
    let passage = PASSAGES
        .iter()
        .take(content.passage_index.saturating_add(1))
        .last();
    if let Some(passage) = passage {
        let lines = wrap_text(passage.text, Font::Helvetica, 7.0, safe_w - pad * 2.0);
        let mut y = top - pad - 0.6 * DPI;
        for line in &lines {
            canvas.text_centered(line, Font::Helvetica, 7.0, left, safe_w, y, PURPLE_900);
            y -= 9.0;
        }
        let credit_x = left + safe_w - pad - Font::Helvetica.width_of(passage.credit, 6.0);
        canvas.text(passage.credit, Font::HelveticaBold, 6.0, credit_x, y - 8.0, PURPLE_900);
    }

    // Sunrise | QR | Sunset
    let qr_size = 0.75 * DPI;
    let bottom_y = frame.safe_bottom + pad + 0.3 * DPI;
    let col_w = (safe_w - qr_size - 0.15 * DPI) / 2.0;
    let right_col = left + col_w + qr_size + 0.15 * DPI;

    let birth = format_short_month(or_dash(&content.birth_date));
    let death = format_short_month(or_dash(&content.death_date));
    for (date, label, col_left) in [(&birth, "SUNRISE", left), (&death, "SUNSET", right_col)] {
        canvas.text_centered(
            date,
            Font::HelveticaBold,
            7.0,
            col_left,
            col_w,
            bottom_y + 0.35 * DPI,
            PURPLE_900,
        );
        canvas.text_centered(
            label,
            Font::Helvetica,
            6.0,
            col_left,
            col_w,
            bottom_y + 0.15 * DPI,
            PURPLE_900,
        );
    }

    let matrix = QrMatrix::encode(&content.qr_target, EcLevel::H)?;
    canvas.qr(
        &matrix,
        left + col_w + 0.075 * DPI,
        bottom_y,
        qr_size,
        1,
        Rgb::from_u8(0x58, 0x1c, 0x87),
        None,
    );

    let honoring_y = bottom_y - 0.2 * DPI;
    canvas.text_centered(
        "Honoring your loved one with dignity and respect.",
        Font::Helvetica,
        6.0,
        left,
        safe_w,
        honoring_y,
        PURPLE_700,
    );
    canvas.text_centered(
        &content.counselor_line(),
        Font::HelveticaBold,
        6.0,
        left,
        safe_w,
        honoring_y - 7.0,
        PURPLE_700,
    );

    canvas.finish()
}

pub(super) fn poster(content: &PrintContent) -> Result<Vec<u8>, PdfError> {
    let frame = Frame::new(PrintFormat::Poster);
    let mut canvas = Canvas::new(frame.width, frame.height);
    photo_backdrop(&mut canvas, &frame, content.photo.as_deref())?;

    let container = 1.25 * DPI;
    let inner = DPI;
    let qr_x = frame.safe_left + (frame.safe_w - container) / 2.0;
    let qr_y = frame.safe_bottom + 1.75 * DPI;
    canvas.fill_rect(qr_x, qr_y, container, container, Rgb::WHITE);

    let matrix = QrMatrix::encode(&content.qr_target, EcLevel::H)?;
    let inset = (container - inner) / 2.0;
    canvas.qr(
        &matrix,
        qr_x + inset,
        qr_y + inset,
        inner,
        1,
        Rgb::from_u8(0x58, 0x1c, 0x87),
        None,
    );

    let row_y = qr_y + container + 0.2 * DPI;
    let col_w = frame.safe_w / 3.0;
    canvas.text_centered(
        or_dash(&content.full_name),
        Font::HelveticaBold,
        14.0,
        frame.safe_left,
        frame.safe_w,
        row_y + 0.5 * DPI,
        Rgb::WHITE,
    );

    for (date, label, col_left) in [
        (or_dash(&content.birth_date), "SUNRISE", frame.safe_left),
        (or_dash(&content.death_date), "SUNSET", frame.safe_left + col_w * 2.0),
    ] {
        canvas.text_centered(date, Font::HelveticaBold, 6.0, col_left, col_w, row_y, Rgb::WHITE);
        canvas.text_centered(
            label,
            Font::Helvetica,
            5.0,
            col_left,
            col_w,
            row_y - 6.0,
            Rgb::gray(0.9),
        );
    }

    canvas.finish()
}

/// 6 in square: fitted photo on white with a 0.75 in QR in the bottom-left.
pub(super) fn acrylic(content: &PrintContent) -> Result<Vec<u8>, PdfError> {
    let (size, _) = page_size(PrintFormat::Acrylic);
    let mut canvas = Canvas::new(size, size);
    canvas.fill_rect(0.0, 0.0, size, size, Rgb::WHITE);

    if let Some(bytes) = content.photo.as_deref().filter(|p| !p.is_empty()) {
        match decode(bytes) {
            Ok(image) => {
                let image = downscale(&image).to_rgb8();
                let (w, h) = fit(image.width(), image.height(), size);
                canvas.image(&image, (size - w) / 2.0, (size - h) / 2.0, w, h);
            }
            Err(e) => warn!(error = %e, "Skipping acrylic photo"),
        }
    }

    match QrMatrix::encode(&content.qr_target, EcLevel::H) {
        Ok(matrix) => {
            let margin = 0.1 * DPI;
            canvas.qr(
                &matrix,
                margin,
                margin,
                0.75 * DPI,
                1,
                Rgb::BLACK,
                Some(Rgb::WHITE),
            );
        }
        Err(e) => warn!(error = %e, "Skipping acrylic QR code"),
    }

    canvas.finish()
}

/// Largest `w` x `h` with the image's aspect inside a `bound` square.
#[allow(clippy::cast_precision_loss)]
fn fit(width: u32, height: u32, bound: f32) -> (f32, f32) {
    let aspect = width as f32 / height.max(1) as f32;
    if aspect > 1.0 {
        (bound, bound / aspect)
    } else {
        (bound * aspect, bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_short_month() {
        assert_eq!(format_short_month("March 3, 1941"), "Mar 3, 1941");
        assert_eq!(format_short_month("june 9, 2025"), "june 9, 2025");
        assert_eq!(format_short_month("July 4"), "July 4");
        assert_eq!(format_short_month("SEPTEMBER 1 - December 25"), "SEP 1 - Dec 25");
        assert_eq!(format_short_month("Mayfield"), "Mayfield");
        assert_eq!(format_short_month(""), "");
    }

    #[test]
    fn test_fit_preserves_aspect() {
        assert_eq!(fit(200, 100, 432.0), (432.0, 216.0));
        assert_eq!(fit(100, 200, 432.0), (216.0, 432.0));
        assert_eq!(fit(50, 50, 432.0), (432.0, 432.0));
    }

    #[test]
    fn test_passages_fit_card_back() {
        let width = 4.0 * DPI - SAFE * 2.0 - 0.2 * DPI;
        for passage in PASSAGES {
            let lines = wrap_text(passage.text, Font::Helvetica, 7.0, width);
            // Must leave room above the QR row
            assert!(lines.len() <= 20, "{}", passage.credit);
        }
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(""), EM_DASH);
        assert_eq!(or_dash("  "), EM_DASH);
        assert_eq!(or_dash("Ada"), "Ada");
    }
}
