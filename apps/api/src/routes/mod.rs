pub mod health;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::parsing::handlers;
use crate::state::AppState;

pub const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

/// Multipart framing overhead allowed on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size_bytes() + MULTIPART_OVERHEAD_BYTES;

    let api = Router::new()
        .route("/api/v1/resume-parse", post(handlers::handle_resume_parse))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_internal_api_key,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(api)
        .with_state(state)
}

/// Rejects requests without the configured `X-Internal-API-Key`.
/// A no-op when no key is configured.
async fn require_internal_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.internal_api_key.as_deref() {
        let provided = request
            .headers()
            .get(INTERNAL_API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if !provided.is_some_and(|key| keys_match(key, expected)) {
            return Err(AppError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

/// Constant-time over the key contents: every byte is compared even after
/// the first mismatch.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
