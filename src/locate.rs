use serde_json::Value;

/// Find a playable URL in a terminal job payload.
///
/// Service revisions have nested the output in different places; probe the
/// known shapes in priority order and short-circuit on the first string hit.
/// `None` is a legitimate answer and sends the caller to the binary-content
/// fallback, not an error.
pub fn locate_asset_url(payload: &Value) -> Option<&str> {
    bundled_video(payload)
        .or_else(|| top_level_url(payload))
        .or_else(|| first_generation_url(payload))
}

// {"assets": {"video": "https://...mp4"}}
fn bundled_video(payload: &Value) -> Option<&str> {
    payload.get("assets")?.get("video")?.as_str()
}

// {"url": "https://...mp4"}
fn top_level_url(payload: &Value) -> Option<&str> {
    payload.get("url")?.as_str()
}

// {"generations": [{"url": "https://...mp4"}, ...]}
fn first_generation_url(payload: &Value) -> Option<&str> {
    payload.get("generations")?.as_array()?.first()?.get("url")?.as_str()
}
