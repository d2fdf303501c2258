use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

/// Generation mode. Pro selects the premium model, the longer default clip
/// length, and unlocks the high-resolution sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Standard,
    Pro,
}

impl Tier {
    pub fn model<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Tier::Standard => &config.model_standard,
            Tier::Pro => &config.model_pro,
        }
    }

    pub fn default_seconds(&self, config: &Config) -> ClipSeconds {
        match self {
            Tier::Standard => config.default_seconds_standard,
            Tier::Pro => config.default_seconds_pro,
        }
    }
}

/// Output resolutions the generation API accepts. The two HD sizes are only
/// valid on the pro model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSize {
    Landscape720,
    Portrait720,
    LandscapeHd,
    PortraitHd,
}

impl VideoSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSize::Landscape720 => "1280x720",
            VideoSize::Portrait720 => "720x1280",
            VideoSize::LandscapeHd => "1792x1024",
            VideoSize::PortraitHd => "1024x1792",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1280x720" => Some(VideoSize::Landscape720),
            "720x1280" => Some(VideoSize::Portrait720),
            "1792x1024" => Some(VideoSize::LandscapeHd),
            "1024x1792" => Some(VideoSize::PortraitHd),
            _ => None,
        }
    }

    pub fn requires_pro(&self) -> bool {
        matches!(self, VideoSize::LandscapeHd | VideoSize::PortraitHd)
    }
}

/// Clip length in seconds, serialized as the string the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipSeconds {
    Four,
    Eight,
    Twelve,
}

impl ClipSeconds {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipSeconds::Four => "4",
            ClipSeconds::Eight => "8",
            ClipSeconds::Twelve => "12",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "4" => Some(ClipSeconds::Four),
            "8" => Some(ClipSeconds::Eight),
            "12" => Some(ClipSeconds::Twelve),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("unsupported size `{0}`")]
    UnknownSize(String),

    #[error("size {0} requires the pro tier")]
    SizeRequiresPro(&'static str),

    #[error("unsupported clip length `{0}` (expected 4, 8 or 12)")]
    UnknownSeconds(String),
}

/// An immutable generation order: user input resolved against the
/// tier-dependent defaults. The remote model identifier is fixed here so the
/// tier decision is made exactly once.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub tier: Tier,
    pub model: String,
    pub size: VideoSize,
    pub seconds: ClipSeconds,
}

impl GenerationRequest {
    pub fn build(
        prompt: &str,
        tier: Tier,
        size: Option<&str>,
        seconds: Option<&str>,
        config: &Config,
    ) -> Result<Self, InvalidRequest> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(InvalidRequest::EmptyPrompt);
        }

        let size = match size {
            Some(raw) => {
                VideoSize::parse(raw).ok_or_else(|| InvalidRequest::UnknownSize(raw.to_string()))?
            }
            None => config.default_size,
        };
        if size.requires_pro() && tier != Tier::Pro {
            return Err(InvalidRequest::SizeRequiresPro(size.as_str()));
        }

        let seconds = match seconds {
            Some(raw) => ClipSeconds::parse(raw)
                .ok_or_else(|| InvalidRequest::UnknownSeconds(raw.to_string()))?,
            None => tier.default_seconds(config),
        };

        Ok(Self {
            prompt: prompt.to_string(),
            tier,
            model: tier.model(config).to_string(),
            size,
            seconds,
        })
    }
}

/// Normalized view of the remote `status` field. Unrecognized values map to
/// `Unknown` and keep the poll loop going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

impl JobStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => JobStatus::Queued,
            "running" | "in_progress" | "processing" => JobStatus::Running,
            "succeeded" | "completed" | "ready" => JobStatus::Succeeded,
            "failed" | "error" => JobStatus::Failed,
            "cancelled" | "canceled" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }
}

/// One poll response: the whole remote document plus its normalized status.
/// Each poll replaces the previous snapshot wholesale, no partial merges.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub payload: Value,
}

/// Raw bytes pulled from a content endpoint, extension inferred from the
/// response media type.
#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Where a finished job's media ended up.
#[derive(Debug, Clone)]
pub enum Asset {
    RemoteUrl(String),
    BinaryPayload {
        bytes: Vec<u8>,
        extension: &'static str,
    },
}
