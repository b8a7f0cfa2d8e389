//! HTTP bindings of the core for both deployment shapes.

use std::{io::ErrorKind, path::Path, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as UrlPath, State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, Method,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, CONTENT_DISPOSITION,
            CONTENT_LENGTH, CONTENT_TYPE,
        },
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::{
    config::{Deployment, non_empty},
    error::ApiError,
    formats::{MediaSummary, ReductionMode},
    links,
    service::{InfoProfile, ServiceError, SpaceService},
};

const QUEUED_MESSAGE: &str = "Your Space download request has been queued";
const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SpaceService>,
    pub deployment: Deployment,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadRequest {
    url: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessRequest {
    url: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    success: bool,
    message: &'static str,
    space_info: MediaSummary,
}

pub fn router(state: AppState) -> Router {
    let api = match state.deployment {
        Deployment::Standalone => Router::new()
            .route("/api/health", get(health).fallback(method_not_allowed))
            .route("/api/download", post(download_info).fallback(method_not_allowed))
            .route(
                "/api/download-space",
                post(download_space).fallback(method_not_allowed),
            )
            .route(
                "/api/process-space",
                post(process_space).fallback(method_not_allowed),
            )
            .route(
                "/download/{filename}",
                get(serve_download).fallback(method_not_allowed),
            ),
        Deployment::Serverless => Router::new()
            .route("/api/health", get(health).fallback(method_not_allowed))
            .route("/api/download", post(download_info).fallback(method_not_allowed)),
    };

    api.fallback(endpoint_not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(build_cors_layer())
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([CONTENT_DISPOSITION])
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut body = serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    });
    if state.deployment == Deployment::Serverless {
        body["platform"] = "serverless".into();
    }
    Json(body)
}

async fn download_info(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<MediaSummary>, ApiError> {
    let payload = accept_json(payload);
    let url = required_url(payload.url.as_deref())?;

    let profile = match state.deployment {
        Deployment::Standalone => InfoProfile::SPACE_AUDIO,
        Deployment::Serverless => {
            InfoProfile::PREFERRED_AUDIO.with_mode(requested_mode(payload.format.as_deref()))
        }
    };

    info!("Processing Space info request for: {url}");
    let summary = state.service.extract_info(url, profile).await?;
    if summary.formats.is_empty() {
        return Err(ServiceError::NoFormats.into());
    }

    Ok(Json(summary))
}

async fn download_space(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<MediaSummary>, ApiError> {
    let payload = accept_json(payload);
    let url = required_url(payload.url.as_deref())?;

    info!("Processing direct Space download for: {url}");
    let download = state.service.download_audio(url).await?;
    info!("Space download ready: {}", download.title);

    Ok(Json(download.into_summary()))
}

async fn process_space(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let payload = accept_json(payload);
    let (Some(url), Some(email)) = (
        payload.url.as_deref().and_then(non_empty),
        payload.email.as_deref(),
    ) else {
        return Err(ApiError::bad_request("URL and email are required"));
    };

    if !links::is_valid_email(email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let space_info = state.service.request_notification(url, email).await?;
    info!("Queued Space notification: {}", space_info.title);

    Ok(Json(ProcessResponse {
        success: true,
        message: QUEUED_MESSAGE,
        space_info,
    }))
}

async fn serve_download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let file = state
        .service
        .cache()
        .resolve_served(&filename)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| {
            info!("Requested file not in cache: {filename:?}");
            ApiError::not_found("File not found")
        })?;

    let handle = open_cached(&file.path).await?;
    let body = Body::from_stream(ReaderStream::new(handle));

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&file.filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file.size));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&file.filename))
            .map_err(ApiError::internal)?,
    );

    Ok((headers, body).into_response())
}

/// The file may be evicted between lookup and open.
async fn open_cached(path: &Path) -> Result<tokio::fs::File, ApiError> {
    tokio::fs::File::open(path).await.map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            ApiError::not_found("File not found")
        } else {
            ApiError::internal(error)
        }
    })
}

async fn endpoint_not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

fn accept_json<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            debug!("Unreadable request body: {rejection}");
            T::default()
        }
    }
}

fn required_url(url: Option<&str>) -> Result<&str, ApiError> {
    url.and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("URL is required"))
}

fn requested_mode(format: Option<&str>) -> ReductionMode {
    match format.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("video") => ReductionMode::VideoOnly,
        Some("mp3" | "audio") => ReductionMode::AudioOnly,
        _ => ReductionMode::AudioPreferred,
    }
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "download.mp3".to_string()
    } else {
        sanitized
    }
}
