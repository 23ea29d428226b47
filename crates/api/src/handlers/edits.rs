//! Handlers for the `/edits` resource: multi-turn image editing.
//!
//! The edit vendor is stateless, so a continuation must replay the whole
//! dialogue. History is reconstructed from the task chain — each task
//! points at the task it continued — rather than stored; the resolver
//! rejects broken or cyclic chains before any task row is created.

use std::collections::{HashMap, HashSet};

use atelier_core::capability::{Capability, GenerationKind};
use atelier_core::conversation::{
    resolve_chain, ChainError, ChainTask, ConversationTurn, TurnPart, TurnRole,
};
use atelier_core::estimation;
use atelier_core::task::{EditParams, TaskParams};
use atelier_core::types::DbId;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use validator::Validate;

use atelier_db::models::account::Account;
use atelier_db::models::status::TaskStatus;
use atelier_db::models::task::{CreateTask, Task, TaskListQuery};
use atelier_db::repositories::{AccountRepo, TaskRepo};

use atelier_provider::edit::{
    EditClient, EditGenerationRequest, EditImageConfig, EditPart, EditTurn,
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

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_resolution() -> String {
    "1K".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEditRequest {
    pub account_id: Option<DbId>,
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    /// Reference images as data URLs or raw base64, at most 14.
    pub images: Option<Vec<String>>,
    /// Pre-uploaded reference image ids.
    pub upload_ids: Option<Vec<String>>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContinueEditRequest {
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/edits
///
/// Starts a new dialogue. Reference images are copied into the task's
/// artifact directory so later continuations can replay them even after
/// the temporary uploads expire.
pub async fn create_edit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateEditRequest>,
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

    let account = select_account(
        &state.pool,
        &state.config.quota,
        Capability::Edit,
        request.account_id,
    )
    .await?;

    let public_id = mint_public_id("edit");

    // Persist reference copies under the task's artifact directory; the
    // stored params carry only the paths.
    let mut saved_refs: Vec<String> = Vec::with_capacity(references.len());
    let mut turn_parts = vec![EditPart::text(request.prompt.clone())];
    for (index, location) in references.iter().enumerate() {
        let Some((mime, bytes)) = decode_image_location(location) else {
            tracing::warn!(task = %public_id, index, "Skipping undecodable reference image");
            continue;
        };
        match state.artifacts.save_reference(&public_id, index, &bytes).await {
            Ok(path) => saved_refs.push(path.to_string_lossy().into_owned()),
            Err(err) => {
                tracing::warn!(task = %public_id, index, error = %err, "Failed to save reference image");
            }
        }
        turn_parts.push(EditPart::image(mime, &bytes));
    }

    let provider_request = EditGenerationRequest {
        contents: vec![EditTurn {
            role: "user",
            parts: turn_parts,
        }],
        image_config: Some(EditImageConfig {
            aspect_ratio: request.aspect_ratio.clone(),
            image_size: request.resolution.clone(),
        }),
    };

    let task = TaskRepo::create(
        &state.pool,
        &CreateTask {
            public_id: public_id.clone(),
            account_id: account.id,
            capability: Capability::Edit,
            status: TaskStatus::Running,
            generation_kind: GenerationKind::from_reference_count(
                Capability::Edit,
                saved_refs.len(),
            ),
            params: TaskParams::Edit(EditParams {
                prompt: request.prompt.clone(),
                aspect_ratio: request.aspect_ratio.clone(),
                resolution: request.resolution.clone(),
                reference_image_paths: saved_refs,
            }),
            usage_consumed: None,
            parent_task_id: None,
            submitted_by: submitter_from_headers(&headers),
        },
    )
    .await?;

    dispatch_edit(&state, &account, task.id, &public_id, provider_request).await?;

    tracing::info!(task = %public_id, account = account.id, "Edit task dispatched");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: TaskView::from(task),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Continue
// ---------------------------------------------------------------------------

/// POST /api/v1/edits/{public_id}/continue
///
/// Extends a finished dialogue with a new instruction. The parent chain is
/// resolved first — a broken or cyclic chain rejects the request before
/// any task row exists — and the replayed history is handed to the vendor
/// as the full turn-by-turn context.
pub async fn continue_edit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(public_id): Path<String>,
    Json(request): Json<ContinueEditRequest>,
) -> AppResult<impl IntoResponse> {
    request
        .validate()
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    let parent = fetch_task(&state.pool, &public_id, Capability::Edit).await?;
    if parent.status() != Some(TaskStatus::Succeeded) {
        return Err(AppError::Conflict(format!(
            "Task '{public_id}' has not succeeded; only finished edits can be continued"
        )));
    }

    let account = AccountRepo::find_by_id(&state.pool, parent.account_id)
        .await?
        .filter(|a| a.is_active && a.supports(Capability::Edit))
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "The account behind task '{public_id}' is gone or no longer configured for edits"
            ))
        })?;

    require_quota(&state.pool, &state.config.quota, &account, Capability::Edit, 1).await?;

    let arena = build_chain_arena(&state.pool, &parent).await?;
    let turns = resolve_chain(&arena, parent.id, &request.prompt)?;
    let contents = to_edit_turns(&state, &turns).await;

    let new_public_id = mint_public_id("edit");
    let parent_params = match &parent.params.0 {
        TaskParams::Edit(params) => params.clone(),
        _ => {
            return Err(AppError::Internal(format!(
                "Task '{public_id}' has non-edit parameters"
            )))
        }
    };

    let task = TaskRepo::create(
        &state.pool,
        &CreateTask {
            public_id: new_public_id.clone(),
            account_id: account.id,
            capability: Capability::Edit,
            status: TaskStatus::Running,
            generation_kind: GenerationKind::Continuation,
            params: TaskParams::Edit(EditParams {
                prompt: request.prompt.clone(),
                aspect_ratio: parent_params.aspect_ratio,
                resolution: parent_params.resolution,
                reference_image_paths: Vec::new(),
            }),
            usage_consumed: None,
            parent_task_id: Some(parent.id),
            submitted_by: submitter_from_headers(&headers),
        },
    )
    .await?;

    // Continuations inherit the sizing of the image being edited.
    let provider_request = EditGenerationRequest {
        contents,
        image_config: None,
    };
    dispatch_edit(&state, &account, task.id, &new_public_id, provider_request).await?;

    tracing::info!(
        task = %new_public_id,
        parent = %public_id,
        "Continuation dispatched",
    );
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: TaskView::from(task),
        }),
    ))
}

// ---------------------------------------------------------------------------
// Chain plumbing
// ---------------------------------------------------------------------------

/// Collect the task chain ending at `leaf` into an arena for the resolver.
///
/// A parent id that fetches nothing is a broken chain; a repeat visit is a
/// cycle. Both reject the continuation rather than replaying a wrong or
/// endless history.
async fn build_chain_arena(
    pool: &atelier_db::DbPool,
    leaf: &Task,
) -> AppResult<HashMap<DbId, ChainTask>> {
    let mut arena = HashMap::new();
    let mut visited = HashSet::new();
    let mut current = leaf.clone();

    loop {
        if !visited.insert(current.id) {
            return Err(ChainError::Cycle { task: current.id }.into());
        }
        arena.insert(current.id, chain_node(&current));

        match current.parent_task_id {
            Some(parent_id) => {
                current = TaskRepo::find_by_id(pool, parent_id)
                    .await?
                    .ok_or(ChainError::Broken { missing: parent_id })?;
            }
            None => break,
        }
    }

    Ok(arena)
}

fn chain_node(task: &Task) -> ChainTask {
    ChainTask {
        id: task.id,
        parent: task.parent_task_id,
        prompt: task.params.prompt().map(str::to_string),
        reference_images: task.params.reference_images(),
        result_images: task
            .result
            .as_ref()
            .map(|r| r.image_locations())
            .unwrap_or_default(),
        succeeded: task.status() == Some(TaskStatus::Succeeded),
    }
}

/// Materialize resolved turns into vendor turns, loading image bytes
/// lazily. Unreadable artifacts are skipped with a warning — a chain with
/// a lost file still replays its text.
async fn to_edit_turns(state: &AppState, turns: &[ConversationTurn]) -> Vec<EditTurn> {
    let mut out = Vec::with_capacity(turns.len());
    for turn in turns {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        };

        let mut parts = Vec::with_capacity(turn.parts.len());
        for part in &turn.parts {
            match part {
                TurnPart::Text(text) => parts.push(EditPart::text(text.clone())),
                TurnPart::Image(location) => {
                    if let Some(part) = load_image_part(state, location).await {
                        parts.push(part);
                    }
                }
            }
        }

        if !parts.is_empty() {
            out.push(EditTurn { role, parts });
        }
    }
    out
}

async fn load_image_part(state: &AppState, location: &str) -> Option<EditPart> {
    if location.starts_with("data:") {
        let (mime, bytes) = decode_image_location(location)?;
        return Some(EditPart::image(mime, &bytes));
    }

    match state.artifacts.read(std::path::Path::new(location)).await {
        Ok(bytes) => Some(EditPart::image("image/png", &bytes)),
        Err(err) => {
            tracing::warn!(location, error = %err, "Skipping unreadable chain image");
            None
        }
    }
}

/// Decode a data URL or raw base64 into `(mime, bytes)`.
fn decode_image_location(location: &str) -> Option<(String, Vec<u8>)> {
    if let Some(rest) = location.strip_prefix("data:") {
        let (mime, data) = rest.split_once(";base64,")?;
        let bytes = BASE64.decode(data.as_bytes()).ok()?;
        Some((mime.to_string(), bytes))
    } else {
        let bytes = BASE64.decode(location.as_bytes()).ok()?;
        Some(("image/png".to_string(), bytes))
    }
}

async fn dispatch_edit(
    state: &AppState,
    account: &Account,
    task_id: DbId,
    public_id: &str,
    request: EditGenerationRequest,
) -> AppResult<()> {
    let client = EditClient::new(
        state.http.clone(),
        account
            .edit_base_url
            .clone()
            .expect("selection guarantees edit configuration"),
        account
            .edit_api_key
            .clone()
            .expect("selection guarantees edit configuration"),
        account
            .edit_model
            .clone()
            .unwrap_or_else(|| "gemini-3-pro-image-preview".to_string()),
        state.config.provider.generate_timeout(),
    );

    let job = DispatchJob {
        task_id,
        public_id: public_id.to_string(),
        account_id: account.id,
        capability: Capability::Edit,
        call: ProviderCall::Edit { client, request },
    };

    if let Err(reason) = state.dispatcher.dispatch(job).await {
        TaskRepo::mark_failed(
            &state.pool,
            task_id,
            atelier_core::task::FailureKind::Internal,
            &reason,
        )
        .await?;
        return Err(AppError::Internal(reason));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List / get / delete
// ---------------------------------------------------------------------------

/// GET /api/v1/edits
pub async fn list_edit_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks = TaskRepo::list(&state.pool, Capability::Edit.as_str(), &query).await?;
    Ok(Json(ListResponse::new(
        tasks.into_iter().map(TaskView::from).collect(),
    )))
}

/// GET /api/v1/edits/{public_id}
pub async fn get_edit_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let task = fetch_task(&state.pool, &public_id, Capability::Edit).await?;
    Ok(Json(DataResponse {
        data: TaskView::from(task),
    }))
}

/// DELETE /api/v1/edits/{public_id}
///
/// Removes the task row and its artifact directory. A task that a
/// continuation still references is rejected — deleting it would orphan
/// the chain.
pub async fn delete_edit_task(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    delete_task(&state, &public_id, Capability::Edit).await?;
    Ok(StatusCode::NO_CONTENT)
}
