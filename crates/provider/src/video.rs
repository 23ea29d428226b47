//! Client for the asynchronous video generation vendor.
//!
//! Submission is synchronous — the vendor validates the job and returns a
//! task id immediately — but rendering is not: progress is observed by
//! polling the task resource until it reports a terminal phase.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{api_error, ProviderError};

/// HTTP client for one account's video endpoint.
pub struct VideoClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    submit_timeout: Duration,
    poll_timeout: Duration,
}

/// A piece of the submission `content` array: prompt text or a reference
/// image, optionally tagged with its frame role.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VideoContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<FrameRole>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Which frame a reference image pins when both ends are supplied.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    FirstFrame,
    LastFrame,
}

/// A full submission body.
#[derive(Debug, Clone, Serialize)]
pub struct VideoGenerationRequest {
    pub model: String,
    pub content: Vec<VideoContentPart>,
    pub generate_audio: bool,
}

/// The vendor accepted the job.
#[derive(Debug, Clone)]
pub struct VideoSubmission {
    pub provider_task_id: String,
}

/// Lifecycle phase the vendor reports for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPhase {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl VideoPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

/// One poll of the vendor's task resource.
#[derive(Debug, Clone)]
pub struct VideoStatusSnapshot {
    pub phase: VideoPhase,
    pub video_url: Option<String>,
    pub last_frame_url: Option<String>,
    /// Tokens the vendor reports as actually consumed; authoritative over
    /// the admission-time estimate.
    pub total_tokens: Option<i64>,
    pub error_message: Option<String>,
}

// Raw wire shapes.

#[derive(Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct PollResponse {
    status: VideoPhase,
    #[serde(default)]
    content: Option<PollContent>,
    #[serde(default)]
    usage: Option<PollUsage>,
    #[serde(default)]
    error: Option<PollError>,
}

#[derive(Deserialize)]
struct PollContent {
    video_url: Option<String>,
    last_frame_url: Option<String>,
}

#[derive(Deserialize)]
struct PollUsage {
    total_tokens: Option<i64>,
}

#[derive(Deserialize)]
struct PollError {
    message: Option<String>,
}

impl VideoClient {
    /// Create a client reusing a shared [`reqwest::Client`] for connection
    /// pooling across accounts.
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        submit_timeout: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            submit_timeout,
            poll_timeout,
        }
    }

    /// Submit a generation job. The vendor answers synchronously with the
    /// task id it assigned.
    pub async fn submit(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<VideoSubmission, ProviderError> {
        let response = self
            .http
            .post(format!("{}/contents/generations/tasks", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(self.submit_timeout)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let status = response.status().as_u16();
        let body: SubmitResponse = response.json().await?;
        let provider_task_id = body.id.ok_or(ProviderError::Api {
            status,
            message: "response is missing the task id".to_string(),
        })?;

        Ok(VideoSubmission { provider_task_id })
    }

    /// Fetch the vendor's current view of a task.
    pub async fn poll(
        &self,
        provider_task_id: &str,
    ) -> Result<VideoStatusSnapshot, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}/contents/generations/tasks/{provider_task_id}",
                self.api_base
            ))
            .bearer_auth(&self.api_key)
            .timeout(self.poll_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: PollResponse = response.json().await?;
        Ok(VideoStatusSnapshot {
            phase: body.status,
            video_url: body.content.as_ref().and_then(|c| c.video_url.clone()),
            last_frame_url: body.content.as_ref().and_then(|c| c.last_frame_url.clone()),
            total_tokens: body.usage.and_then(|u| u.total_tokens),
            error_message: body.error.and_then(|e| e.message),
        })
    }
}
