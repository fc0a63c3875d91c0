//! HTTP surface of the daemon.

use crate::error::ApiError;
use crate::pipeline;
use crate::source::FrameSource;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/faces", get(list_faces))
        .route("/start_stream", post(start_stream))
        .route("/stop_stream", post(stop_stream))
        .route("/video_feed", get(video_feed))
        .route("/add_face", post(add_face))
        .route("/activate_buzzer", post(activate_buzzer))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let labels = state.engine.labels().await?;
    Ok(Json(json!({
        "status": "ok",
        "faces": labels.len(),
        "stream_running": state.stream.is_running(),
        "buzzer": state.buzzer.is_some(),
    })))
}

async fn list_faces(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let labels = state.engine.labels().await?;
    Ok(Json(json!({ "faces": labels })))
}

/// Start the recognition stream.
///
/// With an upstream camera host configured, its own stream is started first
/// and frames are pulled from its feed; otherwise the local camera is
/// opened. Either way the worker thread owns the source for the session.
async fn start_stream(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let source = if state.config.upstream_url.is_some() {
        proxy_upstream(&state, "start_stream").await?;
        let feed_url = state
            .config
            .upstream_feed_url()
            .ok_or_else(|| ApiError::Internal("upstream URL vanished".to_string()))?;
        FrameSource::remote(feed_url)
    } else {
        let device = state.config.camera_device.clone();
        tokio::task::spawn_blocking(move || FrameSource::open_local(&device))
            .await
            .map_err(|e| ApiError::Internal(format!("camera open task failed: {e}")))?
            .map_err(|e| ApiError::BadRequest(format!("camera unavailable: {e}")))?
    };

    let engine = state.engine.clone();
    let quality = state.config.jpeg_quality;
    Arc::clone(&state.stream).start_with(move |stop, sink| {
        pipeline::run_stream(source, engine, stop, sink, quality);
    })?;

    Ok(Json(json!({ "message": "Stream started" })))
}

/// Stop the recognition stream, proxying to the upstream camera host first
/// when one is configured.
async fn stop_stream(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if state.config.upstream_url.is_some() {
        proxy_upstream(&state, "stop_stream").await?;
    }
    state.stream.stop()?;
    Ok(Json(json!({ "message": "Stream stopped" })))
}

/// The annotated MJPEG feed, `multipart/x-mixed-replace` with one JPEG per
/// part. Ends when the stream is stopped.
async fn video_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    let rx = state.stream.take_frames()?;

    let body = Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        let jpeg = rx.recv().await?;
        let mut part =
            Vec::with_capacity(jpeg.len() + 64);
        part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        part.extend_from_slice(&jpeg);
        part.extend_from_slice(b"\r\n");
        Some((Ok::<_, Infallible>(Bytes::from(part)), rx))
    }));

    Ok((
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        body,
    )
        .into_response())
}

/// Enroll a face from a multipart upload with `image` and `label` fields.
async fn add_face(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut image_bytes: Option<Bytes> = None;
    let mut label: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                image_bytes = Some(field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read image field: {e}"))
                })?);
            }
            Some("label") => {
                label = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read label field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let (image_bytes, label) = match (image_bytes, label) {
        (Some(i), Some(l)) if !l.trim().is_empty() => (i, l.trim().to_string()),
        _ => return Err(ApiError::MissingField),
    };

    let decoded = image::load_from_memory(&image_bytes)
        .map_err(|_| ApiError::InvalidImage)?
        .to_rgb8();
    let (width, height) = (decoded.width(), decoded.height());

    let outcome = state
        .engine
        .enroll(label, decoded.into_raw(), width, height)
        .await?;

    tracing::info!(label = %outcome.label, faces_found = outcome.faces_found, "face enrolled");

    Ok(Json(json!({
        "message": format!("Face added for {}", outcome.label),
        "faces_found": outcome.faces_found,
    })))
}

/// Pulse the alarm buzzer. Returns immediately; the pulse runs on a
/// blocking-pool thread.
async fn activate_buzzer(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let buzzer = state.buzzer.clone().ok_or(ApiError::HardwareUnavailable)?;
    let pulse = Duration::from_millis(state.config.buzzer_pulse_ms);

    tokio::task::spawn_blocking(move || {
        if let Err(err) = buzzer.pulse(pulse) {
            tracing::error!(error = %err, "buzzer pulse failed");
        }
    });

    Ok(Json(json!({ "message": "Buzzer activated" })))
}

/// POST to the upstream camera host, relaying its failure status.
async fn proxy_upstream(state: &AppState, path: &str) -> Result<(), ApiError> {
    let base = state
        .config
        .upstream_url
        .as_ref()
        .ok_or_else(|| ApiError::Internal("no upstream configured".to_string()))?;
    let url = format!("{base}/{path}");

    let response = state
        .http
        .post(&url)
        .send()
        .await
        .map_err(|e| ApiError::UpstreamUnreachable(e.to_string()))?;

    if !response.status().is_success() {
        tracing::warn!(url = %url, status = %response.status(), "upstream rejected request");
        return Err(ApiError::Upstream(response.status().as_u16()));
    }

    Ok(())
}
