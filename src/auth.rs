use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

/// Check the gateway bearer key on an intake request.
pub fn require_bearer(
    headers: &HeaderMap,
    expected_key: &str,
) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let Some(raw_header) = headers.get(AUTHORIZATION) else {
        return Err(unauthorized("Missing Authorization header"));
    };

    let Ok(value) = raw_header.to_str() else {
        return Err(unauthorized("Malformed Authorization header"));
    };

    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(unauthorized("Authorization must use a Bearer token"));
    };

    if token.trim() != expected_key {
        return Err(unauthorized("Invalid gateway key"));
    }

    Ok(())
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": message
            }
        })),
    )
}
