use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::parsing::{parse_document, DocumentUpload, ParseMeta};
use crate::schema::ResumeRecord;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Serialize)]
pub struct ResumeParseResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: ResumeRecord,
    pub meta: ParseMeta,
}

/// POST /api/v1/resume-parse
/// Multipart form: `file` (PDF or DOCX, required), `user_id` (optional).
/// A supplied `user_id` is echoed back as `X-User-Id`.
pub async fn handle_resume_parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(HeaderMap, Json<ResumeParseResponse>), AppError> {
    let limit_mb = state.config.max_file_size_mb;
    let limit = state.config.max_file_size_bytes();

    let mut file: Option<(Option<String>, Option<String>, Bytes)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, limit_mb))?;
                file = Some((filename, content_type, bytes));
            }
            Some("user_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, limit_mb))?;
                user_id = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() > limit {
        return Err(AppError::PayloadTooLarge { limit_mb });
    }

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        request_id = %request_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        filename = filename.as_deref().unwrap_or("-"),
        size = bytes.len(),
        sha256 = %upload_digest(&bytes),
        "resume upload received"
    );

    let mut response_headers = HeaderMap::new();
    if let Some(user_id) = user_id.as_deref() {
        match HeaderValue::from_str(user_id) {
            Ok(value) => {
                response_headers.insert(USER_ID_HEADER, value);
            }
            Err(_) => warn!(
                request_id = %request_id,
                "user_id is not a valid header value; not echoed"
            ),
        }
    }

    let upload = DocumentUpload {
        request_id,
        filename,
        content_type,
        bytes,
    };
    let outcome = parse_document(upload, state.completion.as_ref(), &state.options).await?;

    info!(
        request_id = %outcome.meta.request_id,
        attempts = outcome.meta.attempts,
        latency_ms = outcome.meta.latency_ms,
        warnings = outcome.meta.warnings.len(),
        "resume parsed"
    );

    Ok((
        response_headers,
        Json(ResumeParseResponse {
            success: true,
            message: "Resume parsed successfully",
            data: outcome.record,
            meta: outcome.meta,
        }),
    ))
}

/// Hex SHA-256 of the raw upload, logged so a request can be matched to its file.
fn upload_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn multipart_error(e: MultipartError, limit_mb: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit_mb }
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}
