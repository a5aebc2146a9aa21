use axum::{
    body::Body,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ApiError;
use crate::handlers::ClientOrigin;
use crate::ledger::QuotaStatus;
use crate::metrics::{BYTES_SAVED, COMPRESSION_LATENCY, COMPRESSIONS, QUOTA_REJECTIONS, RATE_LIMITED, REQUEST_TOTAL};
use crate::models::CompressionOutcome;
use crate::profile::CompressionPreset;
use crate::state::AppState;

// Fields of the multipart upload form
#[derive(Default)]
struct Upload {
    user_id: Option<String>,
    level: Option<String>,
    file_name: Option<String>,
    file: Option<Vec<u8>>,
}

fn upload_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE")
    } else {
        ApiError::bad_request("INVALID_UPLOAD")
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                upload.file_name = field.file_name().map(str::to_string);
                upload.file = Some(field.bytes().await.map_err(upload_error)?.to_vec());
            }
            Some("userId") => upload.user_id = Some(field.text().await.map_err(upload_error)?),
            Some("compressionLevel") => {
                upload.level = Some(field.text().await.map_err(upload_error)?)
            }
            _ => {}
        }
    }
    Ok(upload)
}

// "Report.PDF" -> "Report-compressed.pdf", header-safe ASCII only
fn download_name(original: Option<&str>) -> String {
    let name = original.unwrap_or("").trim();
    let base = name
        .len()
        .checked_sub(4)
        .filter(|&cut| name.get(cut..).is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf")))
        .map_or(name, |cut| &name[..cut]);
    let base: String = base
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let base = if base.trim().is_empty() { "document" } else { base.trim() };
    format!("{}-compressed.pdf", base)
}

fn build_response(
    bytes: Vec<u8>,
    quota: QuotaStatus,
    outcome: &CompressionOutcome,
    file_name: &str,
) -> Result<Response, axum::http::Error> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        );

    if let Some(remaining) = quota.remaining {
        builder = builder.header("X-Remaining-Compressions", remaining.to_string());
    }
    builder = builder
        .header("X-Is-Pro", quota.remaining.is_none().to_string())
        .header("X-Original-Size", outcome.original_size.to_string())
        .header("X-Compressed-Size", outcome.compressed_size.to_string())
        .header("X-Compression-Path", outcome.path.as_str());

    if let Some(percent) = outcome.reduction_percent() {
        builder = builder.header("X-Reduction-Percent", percent.to_string());
    }
    if let Some(grams) = outcome.co2_saved_grams() {
        builder = builder.header("X-CO2-Saved-Grams", grams.to_string());
    }

    builder.body(Body::from(bytes))
}

pub async fn compress_handler(
    State(state): State<Arc<AppState>>,
    ClientOrigin(origin): ClientOrigin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    REQUEST_TOTAL.inc();

    if !state.rate_limiter.admit(&origin) {
        RATE_LIMITED.inc();
        return Err(ApiError::rate_limited());
    }

    let multipart = multipart.map_err(|_| ApiError::bad_request("INVALID_UPLOAD"))?;
    let upload = read_upload(multipart).await?;

    let user_id = upload
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_USER_ID"))?;
    let input = upload.file.ok_or_else(|| ApiError::bad_request("MISSING_FILE"))?;

    // refunded on drop unless committed once the response is built
    let reservation = state.ledger.reserve(&user_id).map_err(|_| {
        QUOTA_REJECTIONS.inc();
        ApiError::limit_reached()
    })?;

    let preset = CompressionPreset::parse(upload.level.as_deref());
    let timer = COMPRESSION_LATENCY.start_timer();
    let execution = state.executor.execute(&input, &preset.profile()).await;
    timer.observe_duration();

    let outcome = CompressionOutcome {
        original_size: input.len(),
        compressed_size: execution.bytes.len(),
        path: execution.path,
    };
    COMPRESSIONS.with_label_values(&[outcome.path.as_str()]).inc();
    BYTES_SAVED.inc_by(outcome.saved_bytes() as f64);
    info!(
        user_id = %user_id,
        %preset,
        path = %outcome.path,
        original = outcome.original_size,
        compressed = outcome.compressed_size,
        "compression finished"
    );

    let file_name = download_name(upload.file_name.as_deref());
    let response = build_response(execution.bytes, reservation.status(), &outcome, &file_name)
        .map_err(|e| {
            error!(error = %e, "failed to build compression response");
            ApiError::server_error()
        })?;
    reservation.commit();
    Ok(response)
}
