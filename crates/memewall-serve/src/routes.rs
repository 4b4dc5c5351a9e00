// ABOUTME: Route handlers and middleware for the HTTP front-end.
// ABOUTME: Health check, show, upload with its file filter, token gate and request logging.

use crate::error::{ApiResponse, Result, ServeError};
use crate::ServeState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use memewall_core::store::{is_allowed_extension, split_file_name};
use memewall_core::{Credential, Identity};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Form fields that may carry the uploaded image.
const FILE_FIELDS: &[&str] = &["file", "meme"];

#[derive(Debug, Deserialize)]
pub struct ShowRequest {
    pub name: String,
}

pub async fn health() -> &'static str {
    "OK"
}

/// POST /{version}/meme/show
pub async fn show(
    State(state): State<ServeState>,
    Extension(identity): Extension<Identity>,
    body: std::result::Result<Json<ShowRequest>, JsonRejection>,
) -> Result<ApiResponse> {
    let Json(body) = body.map_err(|e| ServeError::InvalidParams(e.body_text()))?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ServeError::InvalidParams("name is required".into()));
    }

    let activation = state.router.show(name).await?;
    info!(actor = %identity, pid = activation.pid, artifact = %activation.artifact, "Meme shown");
    Ok(ApiResponse::ok())
}

/// An image part accepted by the upload filter.
#[derive(Debug)]
struct UploadedFile {
    original_name: String,
    extension: String,
    bytes: Vec<u8>,
}

/// POST /{version}/meme/upload (multipart: `name` + `file`/`meme`)
pub async fn upload(
    State(state): State<ServeState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<ApiResponse> {
    let mut name: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await?),
            Some(part) if FILE_FIELDS.contains(&part) => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let extension = filter_upload(&original_name, &content_type)?;
                let bytes = field.bytes().await?.to_vec();
                file = Some(UploadedFile {
                    original_name,
                    extension,
                    bytes,
                });
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServeError::InvalidParams("name is required".into()))?;
    let file = file.ok_or_else(|| ServeError::InvalidParams("file is required".into()))?;

    let artifact = state
        .router
        .upload(&file.bytes, &name, &file.extension)
        .await?;
    info!(
        actor = %identity,
        original = %file.original_name,
        artifact = %artifact.file_name(),
        "Meme uploaded"
    );
    Ok(ApiResponse::ok())
}

/// Accept only allow-listed extensions with an `image/*` content type.
/// Returns the extension as the client sent it.
fn filter_upload(original_name: &str, content_type: &str) -> Result<String> {
    let extension = match split_file_name(original_name) {
        (_, Some(ext)) if is_allowed_extension(ext) => ext.to_string(),
        _ => return Err(ServeError::WrongFileType(original_name.to_string())),
    };
    if !content_type.starts_with("image/") {
        return Err(ServeError::WrongFileType(content_type.to_string()));
    }
    Ok(extension)
}

/// Rejects requests the auth gate denies; passes the caller's identity on.
pub async fn require_token(
    State(state): State<ServeState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let decision = state.gate.authorize(&Credential::Bearer(header));

    match decision {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            info!(path = %request.uri().path(), error = %e, "Request denied");
            ServeError::from(e).into_response()
        }
    }
}

pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP request"
    );
    response
}
