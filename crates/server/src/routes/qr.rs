//! QR code PNG endpoint.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::qr::{self, QrOptions};
use crate::state::AppState;

/// Longest payload accepted in `data`.
const MAX_DATA_LEN: usize = 2048;

const CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Default, Deserialize)]
pub struct QrQuery {
    pub data: Option<String>,
    pub size: Option<u32>,
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub ecl: Option<String>,
    pub margin: Option<u32>,
}

impl QrQuery {
    /// Validated payload and rendering options.
    ///
    /// # Errors
    ///
    /// `BadRequest` for missing data or an unparseable color.
    pub fn options(&self) -> Result<(&str, QrOptions)> {
        let data = self
            .data
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing data parameter.".to_string()))?;
        if data.len() > MAX_DATA_LEN {
            return Err(AppError::BadRequest("QR data too long.".to_string()));
        }

        let defaults = QrOptions::default();
        let options = QrOptions {
            size: qr::clamp_size(self.size),
            dark: self.fg.as_deref().map(qr::parse_color).transpose()?.unwrap_or(defaults.dark),
            light: self.bg.as_deref().map(qr::parse_color).transpose()?.unwrap_or(defaults.light),
            ec_level: self
                .ecl
                .as_deref()
                .and_then(qr::parse_ec_level)
                .unwrap_or(defaults.ec_level),
            margin: self.margin.map_or(defaults.margin, |m| m.min(8)),
        };
        Ok((data, options))
    }
}

/// GET /api/qr?data=&size=&fg=&bg=&ecl=&margin=
#[instrument(skip(state, query), fields(size = query.size))]
pub async fn render(State(state): State<AppState>, Query(query): Query<QrQuery>) -> Result<Response> {
    let (data, options) = query.options()?;
    let key = options.cache_key(data);

    let png = if let Some(hit) = state.qr_cache().get(&key).await {
        hit
    } else {
        let payload = data.to_string();
        let png = tokio::task::spawn_blocking(move || qr::render_png(&payload, &options))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        let png = Bytes::from(png);
        state.qr_cache().insert(key, png.clone()).await;
        png
    };

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, CACHE_CONTROL),
        ],
        png,
    )
        .into_response())
}
