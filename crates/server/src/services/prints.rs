//! Print artifacts: fetch inputs, render off the async runtime, store results.

use std::sync::Arc;

use dash_memories_core::PrintFormat;
use thiserror::Error;
use tracing::instrument;

use crate::services::pdf::{self, PdfError, PrintContent};
use crate::services::storage::{ObjectStorage, StorageError};

/// Formats rendered for a memorial print order.
pub const ORDER_FORMATS: [PrintFormat; 3] =
    [PrintFormat::CardFront, PrintFormat::CardBack, PrintFormat::Poster];

#[derive(Debug, Error)]
pub enum PrintError {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("photo fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("photo fetch returned {0}")]
    FetchStatus(u16),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Download a photo by its public URL.
///
/// # Errors
///
/// Returns `PrintError::Fetch` or `PrintError::FetchStatus` on failure.
#[instrument(skip(http))]
pub async fn fetch_photo(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, PrintError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PrintError::FetchStatus(status.as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Render one format on the blocking pool.
///
/// # Errors
///
/// Returns the layout's `PdfError`, or `Join` if the task panicked.
pub async fn render(format: PrintFormat, content: Arc<PrintContent>) -> Result<Vec<u8>, PrintError> {
    let bytes = tokio::task::spawn_blocking(move || pdf::render(format, &content)).await??;
    Ok(bytes)
}

/// Render card front, card back and poster concurrently.
///
/// Each result is independent; one failing layout does not cancel the others.
pub async fn render_order(
    content: PrintContent,
) -> Vec<(PrintFormat, Result<Vec<u8>, PrintError>)> {
    let content = Arc::new(content);
    let [front, back, poster] = ORDER_FORMATS;
    let (a, b, c) = tokio::join!(
        render(front, Arc::clone(&content)),
        render(back, Arc::clone(&content)),
        render(poster, Arc::clone(&content)),
    );
    vec![(front, a), (back, b), (poster, c)]
}

/// Upload a rendered PDF to `prints/{slug}[-{format}].pdf` and return its
/// public URL.
///
/// # Errors
///
/// Returns `PrintError::Storage` if the upload fails.
#[instrument(skip(storage, bytes), fields(format = %format, size = bytes.len()))]
pub async fn store<S: ObjectStorage>(
    storage: &S,
    bucket: &str,
    slug: &str,
    format: PrintFormat,
    bytes: Vec<u8>,
) -> Result<String, PrintError> {
    let path = format.object_name(slug);
    storage
        .upload(bucket, &path, bytes, "application/pdf")
        .await?;
    Ok(storage.public_url(bucket, &path))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::pdf::tests::jpeg;

    fn content() -> PrintContent {
        PrintContent {
            photo: Some(jpeg(64, 96)),
            qr_target: "https://dash.gift/h/000042".into(),
            full_name: "Ada Lovelace".into(),
            birth_date: "December 10, 1815".into(),
            death_date: "November 27, 1852".into(),
            ..PrintContent::default()
        }
    }

    #[tokio::test]
    async fn test_render_order_produces_all_three() {
        let results = render_order(content()).await;
        let formats: Vec<_> = results.iter().map(|(f, _)| *f).collect();
        assert_eq!(formats, ORDER_FORMATS.to_vec());
        for (_, result) in results {
            assert!(result.unwrap().starts_with(b"%PDF-"));
        }
    }

    #[tokio::test]
    async fn test_corrupt_photo_fails_only_photo_layouts() {
        let results = render_order(PrintContent {
            photo: Some(b"not an image".to_vec()),
            ..content()
        })
        .await;
        let failed: Vec<_> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(f, _)| *f)
            .collect();
        assert_eq!(failed, vec![PrintFormat::CardFront, PrintFormat::Poster]);
    }
}
