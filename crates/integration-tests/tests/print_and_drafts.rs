//! Print order rendering and draft lifecycle rules.

#![allow(clippy::unwrap_used)]

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document, Object};

use dash_memories_core::{DraftStatus, DraftVideos, PrintFormat, StatusError};
use dash_memories_server::services::pdf::{PrintContent, page_size};
use dash_memories_server::services::prints::render_order;

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([180, 120, 200]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

fn content(photo: Option<Vec<u8>>) -> PrintContent {
    PrintContent {
        photo,
        qr_target: "https://dash.test/h/000042".to_string(),
        full_name: "Ada Lovelace".to_string(),
        birth_date: "1815-12-10".to_string(),
        death_date: "1852-11-27".to_string(),
        passage_index: 99,
        ..PrintContent::default()
    }
}

fn media_box(pdf: &[u8]) -> (f32, f32) {
    let doc = Document::load_mem(pdf).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    let pages = doc
        .objects
        .values()
        .filter_map(|object| object.as_dict().ok())
        .find(|dict| dict.type_is(b"Pages"))
        .unwrap();
    let bounds = pages.get(b"MediaBox").unwrap().as_array().unwrap();
    let width = bounds.get(2).map(Object::as_float).unwrap().unwrap();
    let height = bounds.get(3).map(Object::as_float).unwrap().unwrap();
    (width, height)
}

#[tokio::test]
async fn test_print_order_renders_three_formats() {
    let results = render_order(content(Some(jpeg(60, 90)))).await;
    let formats: Vec<PrintFormat> = results.iter().map(|(format, _)| *format).collect();
    assert_eq!(
        formats,
        [PrintFormat::CardFront, PrintFormat::CardBack, PrintFormat::Poster]
    );

    for (format, result) in results {
        let pdf = result.unwrap();
        assert!(pdf.starts_with(b"%PDF"), "{format}");
        let (width, height) = media_box(&pdf);
        let (expected_w, expected_h) = page_size(format);
        assert!((width - expected_w).abs() < 0.01, "{format}");
        assert!((height - expected_h).abs() < 0.01, "{format}");
    }
}

#[tokio::test]
async fn test_print_order_keeps_independent_results() {
    // A corrupt photo breaks the photo layouts but not the card back.
    let results = render_order(content(Some(b"not an image".to_vec()))).await;
    for (format, result) in results {
        match format {
            PrintFormat::CardBack => assert!(result.is_ok()),
            _ => assert!(result.is_err(), "{format}"),
        }
    }
}

#[test]
fn test_attachment_names() {
    assert_eq!(
        PrintFormat::CardBack.attachment_name("000042"),
        "order-000042-card-back.pdf"
    );
}

#[test]
fn test_status_never_returns_to_draft() {
    assert!(DraftStatus::Draft.can_transition_to(DraftStatus::Paid));
    assert!(DraftStatus::Paid.can_transition_to(DraftStatus::Paid));
    assert!(matches!(
        DraftStatus::Paid.transition(DraftStatus::Draft),
        Err(StatusError::Forbidden { .. })
    ));
}

#[test]
fn test_staging_a_video_keeps_the_final_playback_id() {
    let videos = DraftVideos::finalized("play_1").with_temp_url("https://x/temp-videos/a.mp4");
    assert_eq!(videos.final_mux_playback_id.as_deref(), Some("play_1"));
    assert_eq!(videos.pending_temp_url(), Some("https://x/temp-videos/a.mp4"));

    let swept = videos.without_temp_url();
    assert_eq!(swept.pending_temp_url(), None);
    assert_eq!(swept.final_mux_playback_id.as_deref(), Some("play_1"));
}
