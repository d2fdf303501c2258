use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::{
    config::Config,
    error::ApiError,
    models::{GenerationRequest, JobSnapshot, JobStatus, MediaDownload},
};

const CALL_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// The three operations the tracker needs from the generation service.
/// `VideoApiClient` is the production implementation; tests drive the
/// tracker through scripted fakes.
#[async_trait]
pub trait JobService {
    async fn create_job(&self, request: &GenerationRequest) -> Result<String, ApiError>;
    async fn poll_job(&self, job_id: &str) -> Result<JobSnapshot, ApiError>;
    async fn fetch_content(&self, job_id: &str) -> Result<MediaDownload, ApiError>;
}

/// HTTP client for the video-generation API. Each accepted request gets its
/// own instance, so concurrent jobs never share a session.
#[derive(Debug, Clone)]
pub struct VideoApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VideoApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.video_api_base.clone(),
            api_key: config.video_api_key.clone(),
        }
    }

    // Older deployments served downloads from a different path; try the
    // current endpoint first.
    fn content_candidates(&self, job_id: &str) -> [String; 2] {
        [
            format!("{}/videos/{}/content", self.base_url, job_id),
            format!("{}/videos/{}/download", self.base_url, job_id),
        ]
    }
}

#[async_trait]
impl JobService for VideoApiClient {
    async fn create_job(&self, request: &GenerationRequest) -> Result<String, ApiError> {
        let url = format!("{}/videos", self.base_url);
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "size": request.size.as_str(),
            "seconds": request.seconds.as_str(),
        });

        let response = self
            .http
            .post(&url)
            .timeout(CALL_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Create {
                status: status.as_u16(),
                body,
            });
        }

        let document: Value = response.json().await?;
        let job_id = document
            .get("id")
            .and_then(Value::as_str)
            .ok_or(ApiError::MalformedResponse { field: "id" })?;
        Ok(job_id.to_string())
    }

    async fn poll_job(&self, job_id: &str) -> Result<JobSnapshot, ApiError> {
        let url = format!("{}/videos/{}", self.base_url, job_id);

        let response = self
            .http
            .get(&url)
            .timeout(CALL_TIMEOUT)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Poll {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        let raw_status = payload
            .get("status")
            .and_then(Value::as_str)
            .ok_or(ApiError::MalformedResponse { field: "status" })?;

        Ok(JobSnapshot {
            status: JobStatus::from_raw(raw_status),
            payload,
        })
    }

    async fn fetch_content(&self, job_id: &str) -> Result<MediaDownload, ApiError> {
        let mut last_status = None;
        let mut last_body = "no content endpoint answered".to_string();

        for url in self.content_candidates(job_id) {
            match self
                .http
                .get(&url)
                .timeout(DOWNLOAD_TIMEOUT)
                .bearer_auth(&self.api_key)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let extension = extension_for_media_type(
                            response
                                .headers()
                                .get(CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok()),
                        );
                        let bytes = response.bytes().await?.to_vec();
                        return Ok(MediaDownload { bytes, extension });
                    }
                    last_status = Some(status.as_u16());
                    last_body = response.text().await.unwrap_or_default();
                }
                Err(err) => {
                    last_status = err.status().map(|s| s.as_u16());
                    last_body = err.to_string();
                }
            }
        }

        Err(ApiError::ContentFetch {
            last_status,
            last_body,
        })
    }
}

/// Map a `Content-Type` header to a file extension, defaulting to mp4.
fn extension_for_media_type(media_type: Option<&str>) -> &'static str {
    let Some(media_type) = media_type else {
        return "mp4";
    };
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/mpeg" => "mpg",
        "image/gif" => "gif",
        _ => "mp4",
    }
}
