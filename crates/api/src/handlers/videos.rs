//! Handlers for the `/videos` resource: asynchronous video generation.
//!
//! Video differs from the other capabilities in two ways. The vendor
//! accepts the job synchronously and its token cost is deterministic up
//! front, so the estimate is charged at admission; and completion is
//! observed by polling, so a `sync` operation applies whatever the vendor
//! currently reports. If the vendor's final usage exceeds the charged
//! estimate, the shortfall is charged once — corrections only ever grow
//! the day's counter.

use atelier_core::capability::{Capability, GenerationKind};
use atelier_core::estimation;
use atelier_core::quota;
use atelier_core::task::{FailureKind, TaskParams, TaskResult, VideoParams};
use atelier_core::types::DbId;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use atelier_db::models::account::Account;
use atelier_db::models::status::TaskStatus;
use atelier_db::models::task::{CreateTask, Task, TaskListQuery};
use atelier_db::repositories::{AccountRepo, TaskRepo, UsageRepo};

use atelier_provider::video::{
    FrameRole, ImageUrl, VideoClient, VideoContentPart, VideoGenerationRequest, VideoPhase,
    VideoStatusSnapshot,
};

use crate::error::{AppError, AppResult};
use crate::handlers::{delete_task, fetch_task, submitter_from_headers, TaskView};
use crate::response::{DataResponse, ListResponse};
use crate::selection::{require_quota, select_account};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

fn default_ratio() -> String {
    "16:9".to_string()
}

fn default_resolution() -> String {
    "720p".to_string()
}

fn default_duration() -> u32 {
    5
}

fn default_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVideoRequest {
    pub account_id: Option<DbId>,
    pub prompt: Option<String>,
    /// First-frame reference (URL or data URL).
    pub first_frame: Option<String>,
    /// Last-frame reference; requires a first frame.
    pub last_frame: Option<String>,
    /// Pre-uploaded alternatives to the inline frames.
    pub first_frame_upload: Option<String>,
    pub last_frame_upload: Option<String>,
    #[serde(default = "default_ratio")]
    pub ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[validate(range(min = 1, max = 30))]
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[validate(range(min = 1, max = 9))]
    #[serde(default = "default_count")]
    pub video_count: u32,
    #[serde(default = "default_true")]
    pub generate_audio: bool,
    pub seed: Option<i64>,
    #[serde(default)]
    pub watermark: bool,
    #[serde(default)]
    pub camera_fixed: bool,
}

#[derive(Debug, Deserialize)]
pub struct VideoEstimateQuery {
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_ratio")]
    pub ratio: String,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_count")]
    pub video_count: u32,
}

#[derive(Debug, Serialize)]
pub struct TokenEstimate {
    pub tokens: i64,
    pub price_with_audio: f64,
    pub price_without_audio: f64,
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// POST /api/v1/videos/estimate
pub async fn estimate_tokens(
    State(state): State<AppState>,
    Query(query): Query<VideoEstimateQuery>,
) -> AppResult<impl IntoResponse> {
    let per_video = estimation::estimate_video_tokens(
        &query.resolution,
        &query.ratio,
        query.duration,
        state.config.provider.estimate_fps,
    );
    let tokens = per_video * query.video_count.max(1) as i64;

    Ok(Json(DataResponse {
        data: TokenEstimate {
            tokens,
            price_with_audio: estimation::video_price(tokens, true),
            price_without_audio: estimation::video_price(tokens, false),
        },
    }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/videos
///
/// Submits `video_count` jobs to the vendor. Admission requires the full
/// estimated token cost to fit in today's remaining budget; each accepted
/// job is persisted in `queued` under the vendor-assigned task id and the
/// per-video estimate is charged immediately.
pub async fn create_video_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateVideoRequest>,
) -> AppResult<impl IntoResponse> {
    request
        .validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let first_frame = resolve_frame(
        &state,
        request.first_frame.as_deref(),
        request.first_frame_upload.as_deref(),
    )
    .await?;
    let last_frame = resolve_frame(
        &state,
        request.last_frame.as_deref(),
        request.last_frame_upload.as_deref(),
    )
    .await?;

    if last_frame.is_some() && first_frame.is_none() {
        return Err(AppError::BadRequest(
            "A last-frame reference requires a first-frame reference".to_string(),
        ));
    }

    let prompt = request.prompt.as_deref().unwrap_or("").trim().to_string();
    let reference_count = first_frame.iter().chain(last_frame.iter()).count();
    if reference_count == 0 && prompt.is_empty() {
        return Err(AppError::BadRequest(
            "Text-to-video requires a prompt".to_string(),
        ));
    }
    let kind = GenerationKind::from_reference_count(Capability::Video, reference_count);

    let account = select_account(
        &state.pool,
        &state.config.quota,
        Capability::Video,
        request.account_id,
    )
    .await?;

    // Admission: the whole batch's estimate must fit before any vendor
    // call is made.
    let per_video = estimation::estimate_video_tokens(
        &request.resolution,
        &request.ratio,
        request.duration,
        state.config.provider.estimate_fps,
    );
    let total_needed = per_video * request.video_count as i64;
    require_quota(
        &state.pool,
        &state.config.quota,
        &account,
        Capability::Video,
        total_needed,
    )
    .await?;

    let model = account
        .video_endpoint_id
        .clone()
        .expect("selection guarantees video configuration");
    let content = build_content(&request, &prompt, first_frame.as_deref(), last_frame.as_deref());
    let provider_request = VideoGenerationRequest {
        model,
        content,
        generate_audio: request.generate_audio,
    };

    let client = video_client(&state, &account);
    let submitter = submitter_from_headers(&headers);
    let day = quota::usage_day(Utc::now(), state.config.quota.utc_offset_hours);

    let mut views = Vec::with_capacity(request.video_count as usize);
    for _ in 0..request.video_count {
        // The vendor accepts or rejects synchronously; a rejection here
        // surfaces to the caller and no task row exists for it.
        let submission = client.submit(&provider_request).await?;

        let task = TaskRepo::create(
            &state.pool,
            &CreateTask {
                public_id: submission.provider_task_id,
                account_id: account.id,
                capability: Capability::Video,
                status: TaskStatus::Queued,
                generation_kind: kind,
                params: TaskParams::Video(VideoParams {
                    prompt: request.prompt.clone().filter(|p| !p.trim().is_empty()),
                    resolution: request.resolution.clone(),
                    ratio: request.ratio.clone(),
                    duration_secs: request.duration,
                    generate_audio: request.generate_audio,
                    watermark: request.watermark,
                    camera_fixed: request.camera_fixed,
                    seed: request.seed,
                    first_frame: first_frame.clone(),
                    last_frame: last_frame.clone(),
                }),
                usage_consumed: Some(per_video),
                parent_task_id: None,
                submitted_by: submitter.clone(),
            },
        )
        .await?;

        UsageRepo::charge(&state.pool, account.id, day, Capability::Video, per_video).await?;

        tracing::info!(task = %task.public_id, account = account.id, "Video task submitted");
        views.push(TaskView::from(task));
    }

    Ok((StatusCode::CREATED, Json(ListResponse::new(views))))
}

/// Prefer the inline frame location; fall back to resolving an upload id.
async fn resolve_frame(
    state: &AppState,
    inline: Option<&str>,
    upload_id: Option<&str>,
) -> AppResult<Option<String>> {
    if let Some(location) = inline {
        if !location.is_empty() {
            return Ok(Some(location.to_string()));
        }
    }
    match upload_id {
        Some(id) if !id.is_empty() => {
            let data_url = state.uploads.data_url(id).await.map_err(|err| match err {
                crate::uploads::UploadError::Io(io) => AppError::Internal(io.to_string()),
                other => AppError::BadRequest(other.to_string()),
            })?;
            Ok(Some(data_url))
        }
        _ => Ok(None),
    }
}

/// Assemble the vendor `content` array: prompt text with render flags
/// appended, then the frame references with their roles.
fn build_content(
    request: &CreateVideoRequest,
    prompt: &str,
    first_frame: Option<&str>,
    last_frame: Option<&str>,
) -> Vec<VideoContentPart> {
    let mut flags = format!(
        "--rs {} --rt {} --dur {} --wm {} --cf {}",
        request.resolution, request.ratio, request.duration, request.watermark,
        request.camera_fixed,
    );
    if let Some(seed) = request.seed {
        flags.push_str(&format!(" --seed {seed}"));
    }
    let text = format!("{prompt} {flags}").trim().to_string();

    let mut content = vec![VideoContentPart::Text { text }];
    let both_frames = first_frame.is_some() && last_frame.is_some();

    if let Some(url) = first_frame {
        content.push(VideoContentPart::ImageUrl {
            image_url: ImageUrl { url: url.to_string() },
            // The role tag only matters when both ends are pinned.
            role: both_frames.then_some(FrameRole::FirstFrame),
        });
    }
    if let Some(url) = last_frame {
        content.push(VideoContentPart::ImageUrl {
            image_url: ImageUrl { url: url.to_string() },
            role: Some(FrameRole::LastFrame),
        });
    }

    content
}

fn video_client(state: &AppState, account: &Account) -> VideoClient {
    VideoClient::new(
        state.http.clone(),
        state.config.provider.api_base.clone(),
        account.api_key.clone(),
        state.config.provider.submit_timeout(),
        state.config.provider.poll_timeout(),
    )
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Poll the vendor and apply whatever it currently reports. Idempotent:
/// terminal tasks return as-is, and a failed poll leaves the task
/// untouched — an unreachable vendor says nothing about the job itself.
async fn sync_video_task(state: &AppState, task: Task) -> AppResult<Task> {
    if task.is_terminal() {
        return Ok(task);
    }

    let Some(account) = AccountRepo::find_by_id(&state.pool, task.account_id).await? else {
        tracing::warn!(task = %task.public_id, "Owning account is gone; cannot sync");
        return Ok(task);
    };

    let client = video_client(state, &account);
    let snapshot = match client.poll(&task.public_id).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(task = %task.public_id, error = %err, "Status poll failed");
            return Ok(task);
        }
    };

    apply_snapshot(state, &task, snapshot).await?;

    // Return the stored row, whatever the poll did to it.
    Ok(TaskRepo::find_by_id(&state.pool, task.id)
        .await?
        .unwrap_or(task))
}

async fn apply_snapshot(
    state: &AppState,
    task: &Task,
    snapshot: VideoStatusSnapshot,
) -> AppResult<()> {
    match snapshot.phase {
        VideoPhase::Queued => {}
        VideoPhase::Unknown => {
            tracing::warn!(task = %task.public_id, "Vendor reported an unknown phase");
        }
        VideoPhase::Running => {
            TaskRepo::mark_running(&state.pool, task.id).await?;
        }
        VideoPhase::Succeeded => {
            let Some(video_url) = snapshot.video_url else {
                TaskRepo::mark_failed(
                    &state.pool,
                    task.id,
                    FailureKind::ProviderRejected,
                    "Vendor reported success without a video artifact",
                )
                .await?;
                return Ok(());
            };

            let charged = task.usage_consumed.unwrap_or(0);
            let actual = snapshot.total_tokens.unwrap_or(charged);

            let applied = TaskRepo::mark_succeeded(
                &state.pool,
                task.id,
                &TaskResult::Video {
                    video_url,
                    last_frame_url: snapshot.last_frame_url,
                },
                actual.max(charged),
            )
            .await?;

            // The vendor's reported usage is authoritative. Only the
            // shortfall is charged — the day's counters never shrink — and
            // only when the terminal write landed, so a repeated sync
            // cannot double-charge.
            if applied && actual > charged {
                let day = quota::usage_day(Utc::now(), state.config.quota.utc_offset_hours);
                UsageRepo::charge(
                    &state.pool,
                    task.account_id,
                    day,
                    Capability::Video,
                    actual - charged,
                )
                .await?;
                tracing::info!(
                    task = %task.public_id,
                    estimated = charged,
                    actual,
                    "Corrected video token charge",
                );
            }
        }
        VideoPhase::Failed | VideoPhase::Cancelled | VideoPhase::Expired => {
            let detail = snapshot
                .error_message
                .unwrap_or_else(|| format!("Vendor reported {}", snapshot.phase.as_str()));
            TaskRepo::mark_failed(&state.pool, task.id, FailureKind::ProviderRejected, &detail)
                .await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List / get / sync / delete
// ---------------------------------------------------------------------------

/// GET /api/v1/videos
pub async fn list_video_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks = TaskRepo::list(&state.pool, Capability::Video.as_str(), &query).await?;
    Ok(Json(ListResponse::new(
        tasks.into_iter().map(TaskView::from).collect(),
    )))
}

/// GET /api/v1/videos/{public_id}
///
/// Non-terminal tasks are synced against the vendor before returning.
pub async fn get_video_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = fetch_task(&state.pool, &public_id, Capability::Video).await?;
    let task = sync_video_task(&state, task).await?;
    Ok(Json(DataResponse {
        data: TaskView::from(task),
    }))
}

/// POST /api/v1/videos/{public_id}/sync
pub async fn sync_video_task_handler(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = fetch_task(&state.pool, &public_id, Capability::Video).await?;
    let task = sync_video_task(&state, task).await?;
    Ok(Json(DataResponse {
        data: TaskView::from(task),
    }))
}

/// DELETE /api/v1/videos/{public_id}
pub async fn delete_video_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    delete_task(&state, &public_id, Capability::Video).await?;
    Ok(StatusCode::NO_CONTENT)
}
