//! Handlers for the `/images` resource: single-call still image generation.
//!
//! Admission (account choice + quota pre-check) happens here on the
//! request path; the provider call itself runs in the dispatcher, and the
//! quota charge lands only after the vendor reports how many images it
//! actually produced.

use atelier_core::capability::{Capability, GenerationKind};
use atelier_core::estimation;
use atelier_core::task::{ImageParams, TaskParams};
use atelier_core::types::DbId;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use atelier_db::models::status::TaskStatus;
use atelier_db::models::task::{CreateTask, TaskListQuery};
use atelier_db::repositories::TaskRepo;

use atelier_provider::image::{
    ImageClient, ImageGenerationRequest, ImageRefs, OptimizePromptOptions, SequentialOptions,
};

use crate::engine::{DispatchJob, ProviderCall};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    delete_task, fetch_task, mint_public_id, resolve_references, submitter_from_headers, TaskView,
};
use crate::response::{DataResponse, ListResponse};
use crate::selection::{require_quota, select_account};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

fn default_size() -> String {
    "2K".to_string()
}

fn default_count() -> u32 {
    1
}

fn default_max_images() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_response_format() -> String {
    "url".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateImageRequest {
    pub account_id: Option<DbId>,
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    /// Reference image locations (URLs or data URLs), at most 14.
    pub images: Option<Vec<String>>,
    /// Pre-uploaded reference image ids.
    pub upload_ids: Option<Vec<String>>,
    #[serde(default = "default_size")]
    pub size: String,
    /// Number of independent tasks to create (ignored for sequential sets).
    #[validate(range(min = 1, max = 9))]
    #[serde(default = "default_count")]
    pub count: u32,
    /// Let the vendor render one coherent set instead of `count` tasks.
    #[serde(default)]
    pub sequential_set: bool,
    #[serde(default = "default_max_images")]
    pub max_images: u32,
    #[serde(default)]
    pub watermark: bool,
    #[serde(default = "default_true")]
    pub optimize_prompt: bool,
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageEstimateQuery {
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub sequential_set: bool,
    #[serde(default = "default_max_images")]
    pub max_images: u32,
}

#[derive(Debug, Serialize)]
pub struct ImageEstimate {
    pub count: u32,
    pub price: f64,
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// POST /api/v1/images/estimate
pub async fn estimate_images(
    Query(query): Query<ImageEstimateQuery>,
) -> AppResult<impl IntoResponse> {
    let count =
        estimation::estimated_image_count(query.sequential_set, query.count, query.max_images);
    Ok(Json(DataResponse {
        data: ImageEstimate {
            count,
            price: estimation::image_price(count),
        },
    }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/images
///
/// Creates `count` tasks (one for a sequential set), each persisted in
/// `running` and handed to the dispatcher. Returns 201 with every created
/// task; callers poll task status for results.
pub async fn create_image_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateImageRequest>,
) -> AppResult<impl IntoResponse> {
    request
        .validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let references = resolve_references(
        &state,
        request.images.as_deref(),
        request.upload_ids.as_deref(),
    )
    .await?;
    estimation::validate_reference_count(references.len())?;
    if request.sequential_set {
        estimation::validate_sequential_set(references.len(), request.max_images)?;
    }

    let account = select_account(
        &state.pool,
        &state.config.quota,
        Capability::Image,
        request.account_id,
    )
    .await?;

    // Admission: the expected batch size must fit in today's remaining
    // budget. The real charge happens after the vendor reports the count
    // it actually produced.
    let expected = estimation::estimated_image_count(
        request.sequential_set,
        request.count,
        request.max_images,
    );
    require_quota(
        &state.pool,
        &state.config.quota,
        &account,
        Capability::Image,
        expected as i64,
    )
    .await?;

    let model = account
        .image_endpoint_id
        .clone()
        .expect("selection guarantees image configuration");
    let kind = GenerationKind::from_reference_count(Capability::Image, references.len());
    let submitter = submitter_from_headers(&headers);

    let task_count = if request.sequential_set { 1 } else { request.count };
    let mut views = Vec::with_capacity(task_count as usize);

    for _ in 0..task_count {
        let public_id = mint_public_id("img");

        let provider_request = ImageGenerationRequest {
            model: model.clone(),
            prompt: request.prompt.clone(),
            image: ImageRefs::from_locations(&references),
            size: request.size.clone(),
            watermark: request.watermark,
            response_format: request.response_format.clone(),
            optimize_prompt_options: request.optimize_prompt.then(|| OptimizePromptOptions {
                mode: "standard".to_string(),
            }),
            sequential_image_generation: if request.sequential_set {
                "auto".to_string()
            } else {
                "disabled".to_string()
            },
            sequential_image_generation_options: request
                .sequential_set
                .then(|| SequentialOptions {
                    max_images: request.max_images,
                }),
        };

        let task = TaskRepo::create(
            &state.pool,
            &CreateTask {
                public_id: public_id.clone(),
                account_id: account.id,
                capability: Capability::Image,
                status: TaskStatus::Running,
                generation_kind: kind,
                params: TaskParams::Image(ImageParams {
                    prompt: request.prompt.clone(),
                    size: request.size.clone(),
                    reference_images: references.clone(),
                    sequential_set: request.sequential_set,
                    max_images: request.max_images,
                    watermark: request.watermark,
                    optimize_prompt: request.optimize_prompt,
                    response_format: request.response_format.clone(),
                }),
                usage_consumed: None,
                parent_task_id: None,
                submitted_by: submitter.clone(),
            },
        )
        .await?;

        let client = ImageClient::new(
            state.http.clone(),
            state.config.provider.api_base.clone(),
            account.api_key.clone(),
            state.config.provider.generate_timeout(),
        );

        let job = DispatchJob {
            task_id: task.id,
            public_id: public_id.clone(),
            account_id: account.id,
            capability: Capability::Image,
            call: ProviderCall::Image {
                client,
                request: provider_request,
            },
        };

        if let Err(reason) = state.dispatcher.dispatch(job).await {
            TaskRepo::mark_failed(
                &state.pool,
                task.id,
                atelier_core::task::FailureKind::Internal,
                &reason,
            )
            .await?;
            return Err(AppError::Internal(reason));
        }

        tracing::info!(task = %public_id, account = account.id, "Image task dispatched");
        views.push(TaskView::from(task));
    }

    Ok((StatusCode::CREATED, Json(ListResponse::new(views))))
}

// ---------------------------------------------------------------------------
// List / get / delete
// ---------------------------------------------------------------------------

/// GET /api/v1/images
pub async fn list_image_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks = TaskRepo::list(&state.pool, Capability::Image.as_str(), &query).await?;
    Ok(Json(ListResponse::new(
        tasks.into_iter().map(TaskView::from).collect(),
    )))
}

/// GET /api/v1/images/{public_id}
pub async fn get_image_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = fetch_task(&state.pool, &public_id, Capability::Image).await?;
    Ok(Json(DataResponse {
        data: TaskView::from(task),
    }))
}

/// DELETE /api/v1/images/{public_id}
pub async fn delete_image_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    delete_task(&state, &public_id, Capability::Image).await?;
    Ok(StatusCode::NO_CONTENT)
}
