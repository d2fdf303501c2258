use std::{env, fs, net::SocketAddr};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::models::{ClipSeconds, VideoSize};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub gateway_key: String,
    pub gateway_key_is_fallback: bool,
    pub video_api_base: String,
    pub video_api_key: String,
    pub webhook_url: String,
    pub channel_id: String,
    pub model_standard: String,
    pub model_pro: String,
    pub default_size: VideoSize,
    pub default_seconds_standard: ClipSeconds,
    pub default_seconds_pro: ClipSeconds,
    pub poll_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
    pub max_attachment_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("VIDEOGEN_RELAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let (gateway_key, gateway_key_is_fallback) = resolve_gateway_key();

        let video_api_key = required_env("VIDEOGEN_API_KEY")?;
        let video_api_base = env::var("VIDEOGEN_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        let webhook_url = required_env("VIDEOGEN_RELAY_WEBHOOK_URL")?;
        let channel_id = required_env("VIDEOGEN_RELAY_CHANNEL_ID")?;

        let model_standard =
            env::var("VIDEOGEN_MODEL_STANDARD").unwrap_or_else(|_| "sora-2".to_string());
        let model_pro = env::var("VIDEOGEN_MODEL_PRO").unwrap_or_else(|_| "sora-2-pro".to_string());

        let default_size = env::var("VIDEOGEN_DEFAULT_SIZE")
            .ok()
            .and_then(|v| VideoSize::parse(&v))
            .unwrap_or(VideoSize::Landscape720);

        let default_seconds_standard = env::var("VIDEOGEN_DEFAULT_SECONDS")
            .ok()
            .and_then(|v| ClipSeconds::parse(&v))
            .unwrap_or(ClipSeconds::Eight);

        let default_seconds_pro = env::var("VIDEOGEN_DEFAULT_SECONDS_PRO")
            .ok()
            .and_then(|v| ClipSeconds::parse(&v))
            .unwrap_or(ClipSeconds::Twelve);

        let poll_interval_seconds = env::var("VIDEOGEN_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5);

        let poll_timeout_seconds = env::var("VIDEOGEN_POLL_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1200);

        let max_attachment_bytes = env::var("VIDEOGEN_MAX_ATTACHMENT_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25 * 1024 * 1024);

        Ok(Self {
            bind_addr,
            gateway_key,
            gateway_key_is_fallback,
            video_api_base,
            video_api_key,
            webhook_url,
            channel_id,
            model_standard,
            model_pro,
            default_size,
            default_seconds_standard,
            default_seconds_pro,
            poll_interval_seconds,
            poll_timeout_seconds,
            max_attachment_bytes,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            gateway_key: "test-gateway-key".to_string(),
            gateway_key_is_fallback: false,
            video_api_base: "https://video.invalid/v1".to_string(),
            video_api_key: "test-video-key".to_string(),
            webhook_url: "https://chat.invalid/webhook".to_string(),
            channel_id: "chan_1".to_string(),
            model_standard: "sora-2".to_string(),
            model_pro: "sora-2-pro".to_string(),
            default_size: VideoSize::Landscape720,
            default_seconds_standard: ClipSeconds::Eight,
            default_seconds_pro: ClipSeconds::Twelve,
            poll_interval_seconds: 5,
            poll_timeout_seconds: 1200,
            max_attachment_bytes: 25 * 1024 * 1024,
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{name} must be set"))
}

fn resolve_gateway_key() -> (String, bool) {
    if let Ok(value) = env::var("VIDEOGEN_RELAY_GATEWAY_KEY") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (trimmed.to_string(), false);
        }
    }

    if let Ok(key_file) = env::var("VIDEOGEN_RELAY_GATEWAY_KEY_FILE") {
        match fs::read_to_string(&key_file) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return (trimmed.to_string(), false);
                }
                eprintln!(
                    "[videogen-relay] VIDEOGEN_RELAY_GATEWAY_KEY_FILE is empty: {}. Falling back to generated key.",
                    key_file
                );
            }
            Err(err) => {
                eprintln!(
                    "[videogen-relay] Failed reading VIDEOGEN_RELAY_GATEWAY_KEY_FILE at {}: {}. Falling back to generated key.",
                    key_file, err
                );
            }
        }
    } else {
        eprintln!(
            "[videogen-relay] VIDEOGEN_RELAY_GATEWAY_KEY not set. Falling back to generated key."
        );
    }

    let generated = format!("fallback-{}", Uuid::new_v4());
    (generated, true)
}
