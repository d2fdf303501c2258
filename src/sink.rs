use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, StatusCode};
use serde_json::json;
use tracing::warn;

use crate::{config::Config, error::DeliveryError};

const POST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// A file dropped into the conversation alongside the message text.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Destination for acknowledgments and job outcomes. The production
/// implementation posts to the conversation webhook; tests record.
#[async_trait]
pub trait DeliverySink {
    /// Best-effort immediate acknowledgment. Failures are logged, never
    /// propagated: the job outcome still arrives through `post`.
    async fn acknowledge(&self, text: &str);

    async fn post(&self, text: &str, attachment: Option<Attachment>) -> Result<(), DeliveryError>;
}

/// Posts into the originating conversation through its webhook URL. One
/// instance per tracked job; the session is dropped with the job task.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    webhook_url: String,
    max_attachment_bytes: usize,
}

impl WebhookSink {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone(),
            max_attachment_bytes: config.max_attachment_bytes,
        }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn acknowledge(&self, text: &str) {
        if let Err(err) = self.post(text, None).await {
            warn!("Failed delivering acknowledgment: {err}");
        }
    }

    async fn post(&self, text: &str, attachment: Option<Attachment>) -> Result<(), DeliveryError> {
        let attachment_size = attachment.as_ref().map(|a| a.bytes.len());

        let request = match attachment {
            Some(attachment) => {
                // Refuse locally before shipping megabytes the platform
                // would bounce anyway.
                if attachment.bytes.len() > self.max_attachment_bytes {
                    return Err(DeliveryError::AttachmentRejected {
                        size_bytes: attachment.bytes.len(),
                    });
                }
                let form = multipart::Form::new()
                    .text("payload_json", json!({ "content": text }).to_string())
                    .part(
                        "files[0]",
                        multipart::Part::bytes(attachment.bytes).file_name(attachment.file_name),
                    );
                self.http
                    .post(&self.webhook_url)
                    .timeout(UPLOAD_TIMEOUT)
                    .multipart(form)
            }
            None => self
                .http
                .post(&self.webhook_url)
                .timeout(POST_TIMEOUT)
                .json(&json!({ "content": text })),
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(DeliveryError::AttachmentRejected {
                size_bytes: attachment_size.unwrap_or(0),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
