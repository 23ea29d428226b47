//! HTTP handlers, one module per resource, plus shared task plumbing.

pub mod accounts;
pub mod edits;
pub mod images;
pub mod videos;

use atelier_core::capability::Capability;
use atelier_core::task::{SubmitterIdentity, TaskParams, TaskResult};
use atelier_core::types::{DbId, Timestamp};
use axum::http::HeaderMap;
use serde::Serialize;

use atelier_db::models::task::Task;
use atelier_db::repositories::TaskRepo;
use atelier_db::DbPool;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::uploads::UploadError;

/// Header carrying the submitter identity. Authentication itself is the
/// gateway's job; by the time a request lands here the identity is just an
/// attribution value.
pub const SUBMITTER_HEADER: &str = "x-submitter";

/// API view of a task row.
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: DbId,
    pub task_id: String,
    pub account_id: DbId,
    pub capability: String,
    pub status: &'static str,
    pub generation_kind: String,
    pub params: TaskParams,
    pub result: Option<TaskResult>,
    pub usage_consumed: Option<i64>,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
    pub parent_task_id: Option<DbId>,
    pub submitted_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        let status = task.status().map(|s| s.as_str()).unwrap_or("unknown");
        Self {
            id: task.id,
            task_id: task.public_id,
            account_id: task.account_id,
            capability: task.capability,
            status,
            generation_kind: task.generation_kind,
            params: task.params.0,
            result: task.result.map(|r| r.0),
            usage_consumed: task.usage_consumed,
            failure_kind: task.failure_kind,
            error_message: task.error_message,
            parent_task_id: task.parent_task_id,
            submitted_by: task.submitted_by,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Read the submitter identity from the request headers, defaulting to
/// admin when the gateway sent nothing.
pub fn submitter_from_headers(headers: &HeaderMap) -> SubmitterIdentity {
    headers
        .get(SUBMITTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(SubmitterIdentity::decode)
        .unwrap_or(SubmitterIdentity::Admin)
}

/// Fetch a task by public id and check it belongs to the handler's
/// capability.
pub async fn fetch_task(
    pool: &DbPool,
    public_id: &str,
    capability: Capability,
) -> AppResult<Task> {
    let task = TaskRepo::find_by_public_id(pool, public_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "Task",
            id: public_id.to_string(),
        })?;

    if task.capability() != Some(capability) {
        return Err(AppError::BadRequest(format!(
            "Task '{public_id}' is not a {capability} task"
        )));
    }

    Ok(task)
}

/// Delete a task along with its local artifacts.
///
/// A task that other tasks reference as their parent is load-bearing for
/// chain replay and cannot be deleted. An in-flight provider call for this
/// task is unaffected; its terminal write will simply find no row.
pub async fn delete_task(state: &AppState, public_id: &str, capability: Capability) -> AppResult<()> {
    let task = fetch_task(&state.pool, public_id, capability).await?;

    let children = TaskRepo::children_count(&state.pool, task.id).await?;
    if children > 0 {
        return Err(AppError::Conflict(format!(
            "Task '{public_id}' has {children} continuation(s); delete those first"
        )));
    }

    state
        .artifacts
        .remove_task(public_id)
        .await
        .map_err(|err| AppError::Internal(format!("Failed to remove artifacts: {err}")))?;

    TaskRepo::delete(&state.pool, task.id).await?;
    tracing::info!(task = %public_id, "Task deleted");
    Ok(())
}

/// Merge inline reference-image locations with uploaded file ids resolved
/// through the upload collaborator.
pub async fn resolve_references(
    state: &AppState,
    inline: Option<&[String]>,
    upload_ids: Option<&[String]>,
) -> AppResult<Vec<String>> {
    let mut references: Vec<String> = inline.map(<[String]>::to_vec).unwrap_or_default();

    if let Some(ids) = upload_ids {
        for id in ids {
            let data_url = state.uploads.data_url(id).await.map_err(|err| match err {
                UploadError::Io(io) => AppError::Internal(io.to_string()),
                other => AppError::BadRequest(other.to_string()),
            })?;
            references.push(data_url);
        }
    }

    Ok(references)
}

/// Mint a local public task id with the capability's prefix.
pub fn mint_public_id(prefix: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &token[..16])
}
