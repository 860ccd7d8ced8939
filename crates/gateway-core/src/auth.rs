//! API-key auth filter (component J).
//!
//! Runs in front of every path except `/` and `/health`. A no-op when the
//! loaded config carries no `APIKEY` at all.

use axum::{
    Json,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/" || path == "/health" {
        return next.run(request).await;
    }

    let Some(expected) = state.config.api_key.as_ref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
        });

    match presented {
        None => unauthorized("APIKEY is missing"),
        Some(key) if key == expected.expose_secret() => next.run(request).await,
        Some(_) => unauthorized("Invalid API key"),
    }
}

fn unauthorized(message: &str) -> Response {
    let envelope = json!({
        "error": {
            "message": message,
            "type": "validation_error",
            "code": "invalid_request",
        }
    });
    (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
}
