use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::require_bearer,
    models::{GenerationRequest, Tier},
    sink::WebhookSink,
    tracker::{self, TrackPolicy},
    video_api::VideoApiClient,
    AppState,
};

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

/// Slash-command payload relayed by the chat platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCommand {
    pub channel_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub seconds: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationAccepted {
    pub job_id: String,
    pub model: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

pub async fn create_generation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(command): Json<GenerationCommand>,
) -> impl IntoResponse {
    if let Err(err) = require_bearer(&headers, &state.config.gateway_key) {
        return err.into_response();
    }

    // Gate on the stable channel id; display names drift across renames.
    if command.channel_id != state.config.channel_id {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": {
                    "code": "CHANNEL_NOT_ALLOWED",
                    "message": "Video generation only runs in the designated channel.",
                    "private": true
                }
            })),
        )
            .into_response();
    }

    let request = match GenerationRequest::build(
        &command.prompt,
        command.tier,
        command.size.as_deref(),
        command.seconds.as_deref(),
        &state.config,
    ) {
        Ok(request) => request,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": {
                        "code": "INVALID_GENERATION_REQUEST",
                        "message": err.to_string()
                    }
                })),
            )
                .into_response();
        }
    };

    info!(
        user = command.user_name.as_deref().unwrap_or("unknown"),
        model = %request.model,
        "Accepted generation command"
    );

    // Each job owns its own sessions for both directions.
    let client = VideoApiClient::new(&state.config);
    let sink = WebhookSink::new(&state.config);
    let policy = TrackPolicy::from_config(&state.config);
    let model = request.model.clone();
    let prompt = request.prompt.clone();

    match tracker::submit(client, sink, request, policy).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(GenerationAccepted {
                job_id,
                model,
                prompt,
                created_at: Utc::now(),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": {
                    "code": "JOB_CREATE_FAILED",
                    "message": err.to_string()
                }
            })),
        )
            .into_response(),
    }
}
