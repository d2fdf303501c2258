use thiserror::Error;

/// Failures talking to the remote video-generation service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("video service rejected job creation ({status}): {body}")]
    Create { status: u16, body: String },

    #[error("video service rejected a status poll ({status}): {body}")]
    Poll { status: u16, body: String },

    #[error("no content endpoint returned the video (last status {last_status:?}): {last_body}")]
    ContentFetch {
        last_status: Option<u16>,
        last_body: String,
    },

    #[error("video service response was missing `{field}`")]
    MalformedResponse { field: &'static str },

    #[error("video service transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures posting into the conversation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("attachment of {size_bytes} bytes rejected by the channel")]
    AttachmentRejected { size_bytes: usize },

    #[error("channel webhook rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("channel webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
