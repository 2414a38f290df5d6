//! Image/video generation pipeline: prompt -> image -> video job -> poll.
//!
//! The flow is linear with no back-edges: a failed image call never reaches
//! the video submission, and the status poll runs until completion, failure,
//! cancellation, or the attempt budget is spent.

use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation for an in-flight poll. Cloned into request
/// handlers; `cancel()` makes the next poll iteration abort.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image generation failed: {0}")]
    Image(String),
    #[error("video generation failed: {0}")]
    Video(String),
    #[error("video generation timed out")]
    TimedOut,
    #[error("video generation cancelled")]
    Cancelled,
    #[error("media request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Video job status as reported by the provider. Unknown statuses are
/// treated as still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Provider view of a submitted video job; mutated only by the provider and
/// observed through polling.
#[derive(Debug, Deserialize)]
pub struct VideoJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Image + video generation against one provider.
pub struct MediaPipeline {
    api_key: String,
    base_url: String,
    poll_attempts: u32,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl MediaPipeline {
    pub fn new(
        api_key: String,
        base_url: String,
        poll_attempts: u32,
        poll_interval: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_attempts,
            poll_interval,
            client,
        }
    }

    /// One synchronous image generation call. The provider's raw error body
    /// is surfaced on failure.
    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, MediaError> {
        let url = format!("{}/generate-image", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MediaError::Image(format!("{} {}", status, body)));
        }
        let body: ImageResponse = res.json().await?;
        let encoded = body
            .image
            .ok_or_else(|| MediaError::Image("response missing image payload".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| MediaError::Image(format!("invalid image encoding: {}", e)))
    }

    /// Submit decoded image bytes for animation. Returns the provider job id.
    pub async fn submit_video(&self, image: Vec<u8>) -> Result<String, MediaError> {
        let url = format!("{}/image-to-video", self.base_url);
        let part = reqwest::multipart::Part::bytes(image).file_name("image.png");
        let form = reqwest::multipart::Form::new().part("image", part);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MediaError::Video(format!("{} {}", status, body)));
        }
        let body: SubmitResponse = res.json().await?;
        body.id
            .ok_or_else(|| MediaError::Video("response missing job id".to_string()))
    }

    /// Poll the job until it completes, fails, is cancelled, or the attempt
    /// budget is spent. Fixed interval, no backoff; a non-2xx status check
    /// aborts immediately.
    pub async fn poll_job(&self, id: &str, cancel: &CancelFlag) -> Result<String, MediaError> {
        let url = format!("{}/jobs/{}", self.base_url, id);
        for attempt in 1..=self.poll_attempts {
            if cancel.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            let res = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                return Err(MediaError::Video(format!("{} {}", status, body)));
            }
            let job: VideoJob = res.json().await?;
            log::debug!(
                "video job {} attempt {}/{}: {:?}",
                id,
                attempt,
                self.poll_attempts,
                job.status
            );
            match job.status {
                JobStatus::Completed => {
                    return job.result_url.ok_or_else(|| {
                        MediaError::Video("completed job missing result url".to_string())
                    });
                }
                JobStatus::Failed => {
                    let reason = job.error.unwrap_or_else(|| "job failed".to_string());
                    return Err(MediaError::Video(reason));
                }
                JobStatus::Pending | JobStatus::InProgress | JobStatus::Unknown => {
                    if attempt < self.poll_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }
        Err(MediaError::TimedOut)
    }

    /// Full pipeline: prompt -> image -> video submission -> poll -> asset URL.
    pub async fn generate_video(
        &self,
        prompt: &str,
        cancel: &CancelFlag,
    ) -> Result<String, MediaError> {
        let image = self.generate_image(prompt).await?;
        let job_id = self.submit_video(image).await?;
        log::info!("video job {} submitted, polling for completion", job_id);
        self.poll_job(&job_id, cancel).await
    }
}
