use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::{
    config::Config,
    error::{ApiError, DeliveryError},
    locate::locate_asset_url,
    models::{Asset, GenerationRequest, JobStatus},
    sink::{Attachment, DeliverySink},
    video_api::JobService,
};

/// Display budget for raw service payloads quoted back into the
/// conversation.
const MESSAGE_DIAGNOSTIC_LIMIT: usize = 1900;

/// Polling cadence and budget for one tracked job. The interval is fixed,
/// not adaptive; interval and timeout are independent knobs.
#[derive(Debug, Clone, Copy)]
pub struct TrackPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl TrackPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            timeout: Duration::from_secs(config.poll_timeout_seconds),
        }
    }
}

/// How one polling series ended. Timeout is an outcome, not an error: the
/// remote job may still finish after we stop watching.
#[derive(Debug)]
enum PollOutcome {
    Succeeded(Value),
    Failed(Value),
    TimedOut,
}

/// Create the remote job and acknowledge it in the conversation.
///
/// On success the polling series continues on a detached task and the caller
/// gets the job id back immediately; the task owns its client and sink for
/// its whole lifetime. On a creation error the error is reported at the
/// acknowledgment step and nothing is spawned.
pub async fn submit<C, S>(
    client: C,
    sink: S,
    request: GenerationRequest,
    policy: TrackPolicy,
) -> Result<String, ApiError>
where
    C: JobService + Send + Sync + 'static,
    S: DeliverySink + Send + Sync + 'static,
{
    let job_id = match client.create_job(&request).await {
        Ok(job_id) => job_id,
        Err(err) => {
            sink.acknowledge(&format!(
                "Could not submit your {} request: {}",
                request.model,
                truncate(&err.to_string(), MESSAGE_DIAGNOSTIC_LIMIT)
            ))
            .await;
            return Err(err);
        }
    };

    info!(job_id = %job_id, model = %request.model, "Video job created");
    sink.acknowledge(&format!(
        "Generating with {} (job `{}`): `{}`",
        request.model, job_id, request.prompt
    ))
    .await;

    let spawned_id = job_id.clone();
    tokio::spawn(async move {
        track_job(&client, &sink, &spawned_id, &request, policy).await;
    });

    Ok(job_id)
}

/// Drive one job from submission to a delivered outcome. Every terminal path
/// produces exactly one message in the conversation; errors stay inside this
/// task and never disturb other in-flight jobs.
pub async fn track_job<C, S>(
    client: &C,
    sink: &S,
    job_id: &str,
    request: &GenerationRequest,
    policy: TrackPolicy,
) where
    C: JobService,
    S: DeliverySink,
{
    match poll_until_terminal(client, job_id, policy).await {
        Ok(PollOutcome::Succeeded(payload)) => {
            deliver_result(client, sink, job_id, request, &payload).await;
        }
        Ok(PollOutcome::Failed(payload)) => {
            let diagnostics = truncate(&payload.to_string(), MESSAGE_DIAGNOSTIC_LIMIT);
            post_text(
                sink,
                &format!("Video job `{job_id}` failed:\n```json\n{diagnostics}\n```"),
            )
            .await;
        }
        Ok(PollOutcome::TimedOut) => {
            info!(job_id = %job_id, "Gave up watching job before it finished");
            post_text(
                sink,
                &format!(
                    "Video job `{job_id}` is still running after {}s, so I stopped watching it. \
                     It may yet finish on the service side.",
                    policy.timeout.as_secs()
                ),
            )
            .await;
        }
        Err(err) => {
            post_text(
                sink,
                &format!(
                    "Video job `{job_id}` hit an error while being tracked: {}",
                    truncate(&err.to_string(), MESSAGE_DIAGNOSTIC_LIMIT)
                ),
            )
            .await;
        }
    }
}

async fn poll_until_terminal<C: JobService>(
    client: &C,
    job_id: &str,
    policy: TrackPolicy,
) -> Result<PollOutcome, ApiError> {
    let deadline = Instant::now() + policy.timeout;
    let mut last_status = None;

    loop {
        let snapshot = client.poll_job(job_id).await?;

        if last_status != Some(snapshot.status) {
            info!(job_id = %job_id, status = ?snapshot.status, "Job status changed");
            last_status = Some(snapshot.status);
        }

        match snapshot.status {
            JobStatus::Succeeded => return Ok(PollOutcome::Succeeded(snapshot.payload)),
            JobStatus::Failed | JobStatus::Cancelled => {
                return Ok(PollOutcome::Failed(snapshot.payload))
            }
            JobStatus::Queued | JobStatus::Running | JobStatus::Unknown => {}
        }

        if Instant::now() >= deadline {
            return Ok(PollOutcome::TimedOut);
        }
        sleep(policy.poll_interval).await;
    }
}

/// Resolve the finished job to an asset: direct URL when the payload carries
/// one, binary download otherwise.
async fn resolve_asset<C: JobService>(
    client: &C,
    job_id: &str,
    payload: &Value,
) -> Result<Asset, ApiError> {
    if let Some(url) = locate_asset_url(payload) {
        return Ok(Asset::RemoteUrl(url.to_string()));
    }

    info!(job_id = %job_id, "No asset URL in terminal payload, falling back to content download");
    let download = client.fetch_content(job_id).await?;
    Ok(Asset::BinaryPayload {
        bytes: download.bytes,
        extension: download.extension,
    })
}

async fn deliver_result<C: JobService, S: DeliverySink>(
    client: &C,
    sink: &S,
    job_id: &str,
    request: &GenerationRequest,
    payload: &Value,
) {
    let asset = match resolve_asset(client, job_id, payload).await {
        Ok(asset) => asset,
        Err(err) => {
            post_text(
                sink,
                &format!(
                    "Video job `{job_id}` finished but the result could not be retrieved: {}",
                    truncate(&err.to_string(), MESSAGE_DIAGNOSTIC_LIMIT)
                ),
            )
            .await;
            return;
        }
    };

    let headline = format!("**{} result for:** `{}`", request.model, request.prompt);

    match asset {
        Asset::RemoteUrl(url) => {
            // Bare URL on its own line so the platform can unfurl a player.
            post_text(sink, &format!("{headline}\n{url}")).await;
        }
        Asset::BinaryPayload { bytes, extension } => {
            let size_bytes = bytes.len();
            let attachment = Attachment {
                file_name: format!("{job_id}.{extension}"),
                bytes,
            };
            match sink.post(&headline, Some(attachment)).await {
                Ok(()) => {}
                Err(DeliveryError::AttachmentRejected { .. }) => {
                    post_text(
                        sink,
                        &format!(
                            "Video job `{job_id}` finished, but the {} file was rejected by the \
                             channel as too large to attach.",
                            format_size(size_bytes)
                        ),
                    )
                    .await;
                }
                Err(err) => {
                    error!(job_id = %job_id, "Failed delivering video attachment: {err}");
                }
            }
        }
    }
}

async fn post_text<S: DeliverySink>(sink: &S, text: &str) {
    if let Err(err) = sink.post(text, None).await {
        error!("Failed posting job outcome: {err}");
    }
}

fn format_size(size_bytes: usize) -> String {
    format!("{:.1} MB", size_bytes as f64 / (1024.0 * 1024.0))
}

/// Bound a diagnostic blob for display, respecting char boundaries.
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::models::{ClipSeconds, JobSnapshot, MediaDownload, Tier, VideoSize};

    fn test_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a cat on a skateboard".to_string(),
            tier: Tier::Standard,
            model: "sora-2".to_string(),
            size: VideoSize::Landscape720,
            seconds: ClipSeconds::Eight,
        }
    }

    fn fast_policy() -> TrackPolicy {
        TrackPolicy {
            poll_interval: Duration::from_millis(2),
            timeout: Duration::from_millis(500),
        }
    }

    fn snapshot(raw_status: &str, payload: Value) -> JobSnapshot {
        JobSnapshot {
            status: JobStatus::from_raw(raw_status),
            payload,
        }
    }

    /// Scripted stand-in for the generation service. Poll responses are
    /// consumed front-to-back; the last one repeats forever.
    #[derive(Default)]
    struct ScriptedService {
        create_result: Mutex<Option<Result<String, ApiError>>>,
        poll_error: Mutex<Option<ApiError>>,
        statuses: Mutex<VecDeque<JobSnapshot>>,
        content: Mutex<Option<MediaDownload>>,
        poll_count: AtomicUsize,
        fetch_count: AtomicUsize,
    }

    impl ScriptedService {
        fn with_statuses(statuses: Vec<JobSnapshot>) -> Arc<Self> {
            let service = Self::default();
            *service.statuses.lock().unwrap() = statuses.into();
            Arc::new(service)
        }
    }

    #[async_trait]
    impl JobService for Arc<ScriptedService> {
        async fn create_job(&self, _request: &GenerationRequest) -> Result<String, ApiError> {
            match self.create_result.lock().unwrap().take() {
                Some(result) => result,
                None => Ok("job_1".to_string()),
            }
        }

        async fn poll_job(&self, _job_id: &str) -> Result<JobSnapshot, ApiError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.poll_error.lock().unwrap().take() {
                return Err(err);
            }
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                statuses
                    .front()
                    .cloned()
                    .ok_or(ApiError::MalformedResponse { field: "status" })
            }
        }

        async fn fetch_content(&self, _job_id: &str) -> Result<MediaDownload, ApiError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            match self.content.lock().unwrap().clone() {
                Some(download) => Ok(download),
                None => Err(ApiError::ContentFetch {
                    last_status: Some(404),
                    last_body: "no artifact".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reject_attachments: bool,
        acks: Mutex<Vec<String>>,
        posts: Mutex<Vec<(String, Option<usize>)>>,
    }

    impl RecordingSink {
        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                reject_attachments: true,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl DeliverySink for Arc<RecordingSink> {
        async fn acknowledge(&self, text: &str) {
            self.acks.lock().unwrap().push(text.to_string());
        }

        async fn post(
            &self,
            text: &str,
            attachment: Option<Attachment>,
        ) -> Result<(), DeliveryError> {
            if self.reject_attachments {
                if let Some(attachment) = &attachment {
                    return Err(DeliveryError::AttachmentRejected {
                        size_bytes: attachment.bytes.len(),
                    });
                }
            }
            self.posts
                .lock()
                .unwrap()
                .push((text.to_string(), attachment.map(|a| a.bytes.len())));
            Ok(())
        }
    }

    async fn wait_for_posts(sink: &RecordingSink, count: usize) {
        for _ in 0..500 {
            if sink.posts.lock().unwrap().len() >= count {
                return;
            }
            sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for {count} delivered message(s)");
    }

    #[tokio::test]
    async fn url_result_is_delivered_without_content_fetch() {
        let service = ScriptedService::with_statuses(vec![
            snapshot("queued", json!({ "status": "queued" })),
            snapshot("queued", json!({ "status": "queued" })),
            snapshot(
                "succeeded",
                json!({ "status": "succeeded", "assets": { "video": "https://x/y.mp4" } }),
            ),
        ]);
        let sink = Arc::new(RecordingSink::default());

        let job_id = submit(service.clone(), sink.clone(), test_request(), fast_policy())
            .await
            .unwrap();
        assert_eq!(job_id, "job_1");

        wait_for_posts(&sink, 1).await;

        let acks = sink.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert!(acks[0].contains("job_1"));
        assert!(acks[0].contains("a cat on a skateboard"));

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("https://x/y.mp4"));
        assert!(posts[0].1.is_none(), "result must not carry an attachment");

        assert_eq!(service.poll_count.load(Ordering::SeqCst), 3);
        assert_eq!(service.fetch_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn creation_error_reports_at_acknowledgment_and_spawns_nothing() {
        let service = Arc::new(ScriptedService::default());
        *service.create_result.lock().unwrap() = Some(Err(ApiError::Create {
            status: 403,
            body: "tier not enabled".to_string(),
        }));
        let sink = Arc::new(RecordingSink::default());

        let result = submit(service.clone(), sink.clone(), test_request(), fast_policy()).await;
        assert!(matches!(result, Err(ApiError::Create { status: 403, .. })));

        let acks = sink.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert!(acks[0].contains("403"));
        assert!(acks[0].contains("tier not enabled"));
        drop(acks);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(service.poll_count.load(Ordering::SeqCst), 0);
        assert!(sink.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn binary_fallback_attaches_the_downloaded_file() {
        let service =
            ScriptedService::with_statuses(vec![snapshot("succeeded", json!({ "status": "succeeded" }))]);
        *service.content.lock().unwrap() = Some(MediaDownload {
            bytes: b"video-bytes".to_vec(),
            extension: "mp4",
        });
        let sink = Arc::new(RecordingSink::default());

        track_job(&service, &sink, "job_1", &test_request(), fast_policy()).await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("sora-2"));
        assert_eq!(posts[0].1, Some(11));
        assert_eq!(service.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_attachment_rejection_reports_the_size() {
        let service =
            ScriptedService::with_statuses(vec![snapshot("succeeded", json!({ "status": "succeeded" }))]);
        *service.content.lock().unwrap() = Some(MediaDownload {
            bytes: vec![0u8; 30 * 1024 * 1024],
            extension: "mp4",
        });
        let sink = RecordingSink::rejecting();

        track_job(&service, &sink, "job_1", &test_request(), fast_policy()).await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1, "exactly one rejection message");
        assert!(posts[0].0.contains("30.0 MB"));
        assert!(posts[0].1.is_none());
    }

    #[tokio::test]
    async fn content_fetch_failure_names_the_job() {
        let service =
            ScriptedService::with_statuses(vec![snapshot("succeeded", json!({ "status": "succeeded" }))]);
        let sink = Arc::new(RecordingSink::default());

        track_job(&service, &sink, "job_1", &test_request(), fast_policy()).await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("job_1"));
        assert!(posts[0].0.contains("no artifact"));
    }

    #[tokio::test]
    async fn failure_payload_is_reported_once_and_truncated() {
        let noise = "x".repeat(4000);
        let service = ScriptedService::with_statuses(vec![snapshot(
            "failed",
            json!({ "status": "failed", "error": { "message": noise } }),
        )]);
        let sink = Arc::new(RecordingSink::default());

        track_job(&service, &sink, "job_1", &test_request(), fast_policy()).await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("failed"));
        assert!(posts[0].0.contains("xxxx"));
        assert!(posts[0].0.chars().count() < MESSAGE_DIAGNOSTIC_LIMIT + 100);
    }

    #[tokio::test]
    async fn timeout_emits_one_still_running_message_and_stops_polling() {
        let service =
            ScriptedService::with_statuses(vec![snapshot("queued", json!({ "status": "queued" }))]);
        let sink = Arc::new(RecordingSink::default());
        let policy = TrackPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(30),
        };

        track_job(&service, &sink, "job_1", &test_request(), policy).await;

        let polls_at_timeout = service.poll_count.load(Ordering::SeqCst);
        assert!(polls_at_timeout >= 2);

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("still running"));
        drop(posts);

        sleep(Duration::from_millis(30)).await;
        assert_eq!(
            service.poll_count.load(Ordering::SeqCst),
            polls_at_timeout,
            "no polls may happen after the timeout message"
        );
    }

    #[tokio::test]
    async fn poll_error_becomes_one_failure_message() {
        let service =
            ScriptedService::with_statuses(vec![snapshot("queued", json!({ "status": "queued" }))]);
        *service.poll_error.lock().unwrap() = Some(ApiError::Poll {
            status: 500,
            body: "backend unavailable".to_string(),
        });
        let sink = Arc::new(RecordingSink::default());

        track_job(&service, &sink, "job_1", &test_request(), fast_policy()).await;

        let posts = sink.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.contains("job_1"));
        assert!(posts[0].0.contains("backend unavailable"));
    }

    #[test]
    fn truncate_bounds_long_text() {
        assert_eq!(truncate("short", 10), "short");
        let bounded = truncate(&"y".repeat(50), 10);
        assert_eq!(bounded.chars().count(), 11);
        assert!(bounded.ends_with('…'));
    }

    #[test]
    fn sizes_format_in_megabytes() {
        assert_eq!(format_size(30 * 1024 * 1024), "30.0 MB");
        assert_eq!(format_size(512 * 1024), "0.5 MB");
    }
}
