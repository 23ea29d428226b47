//! Repository for the `tasks` table.
//!
//! Terminal transitions are guarded updates (`WHERE status_id IN
//! (queued, running)`): a task reaches `succeeded` or `failed` at most
//! once, a terminal state is never overwritten, and a write against a row
//! that was deleted mid-flight affects nothing. Callers inspect the
//! returned bool instead of assuming the write landed.

use atelier_core::task::{FailureKind, TaskResult};
use atelier_core::types::DbId;
use sqlx::types::Json;

use crate::models::status::TaskStatus;
use crate::models::task::{CreateTask, Task, TaskListQuery};
use crate::DbPool;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, public_id, account_id, capability, status_id, generation_kind, \
    params, result, usage_consumed, failure_kind, error_message, \
    parent_task_id, submitted_by, created_at, updated_at";

/// SQLite expression producing an RFC 3339 UTC timestamp.
const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 50;

pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task row and return it.
    pub async fn create(pool: &DbPool, input: &CreateTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                 (public_id, account_id, capability, status_id, generation_kind, \
                  params, usage_consumed, parent_task_id, submitted_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.public_id)
            .bind(input.account_id)
            .bind(input.capability.as_str())
            .bind(input.status.id())
            .bind(input.generation_kind.as_str())
            .bind(Json(&input.params))
            .bind(input.usage_consumed)
            .bind(input.parent_task_id)
            .bind(input.submitted_by.encode())
            .fetch_one(pool)
            .await
    }

    /// Find a task by its opaque public id.
    pub async fn find_by_public_id(
        pool: &DbPool,
        public_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE public_id = ?");
        sqlx::query_as::<_, Task>(&query)
            .bind(public_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a task by its row id.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = ?");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks of one capability, newest first, with optional account and
    /// status filters.
    pub async fn list(
        pool: &DbPool,
        capability: &str,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let status_id = params
            .status
            .as_deref()
            .and_then(TaskStatus::from_name)
            .map(TaskStatus::id);

        let mut conditions = vec!["capability = ?".to_string()];
        if params.account_id.is_some() {
            conditions.push("account_id = ?".to_string());
        }
        if status_id.is_some() {
            conditions.push("status_id = ?".to_string());
        }

        let query = format!(
            "SELECT {COLUMNS} FROM tasks WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?",
            conditions.join(" AND "),
        );

        let mut q = sqlx::query_as::<_, Task>(&query).bind(capability);
        if let Some(account_id) = params.account_id {
            q = q.bind(account_id);
        }
        if let Some(status_id) = status_id {
            q = q.bind(status_id);
        }
        q.bind(limit).fetch_all(pool).await
    }

    /// Number of continuations pointing at this task. A task with children
    /// must not be deleted or the chain would orphan.
    pub async fn children_count(pool: &DbPool, id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE parent_task_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// Delete a task row. Returns `false` if it was already gone.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a queued video task to `running` (the provider reported it
    /// started). Returns `false` if the task was not in `queued`.
    pub async fn mark_running(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET status_id = ?, updated_at = {NOW} \
             WHERE id = ? AND status_id = ?"
        );
        let result = sqlx::query(&query)
            .bind(TaskStatus::Running.id())
            .bind(id)
            .bind(TaskStatus::Queued.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply the terminal `succeeded` state with its result payload and the
    /// quantity actually consumed.
    ///
    /// Returns `false` when nothing was written — the task was already
    /// terminal or has been deleted. Either way the caller must not retry.
    pub async fn mark_succeeded(
        pool: &DbPool,
        id: DbId,
        result: &TaskResult,
        usage_consumed: i64,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET status_id = ?, result = ?, usage_consumed = ?, \
                 failure_kind = NULL, error_message = NULL, updated_at = {NOW} \
             WHERE id = ? AND status_id IN (?, ?)"
        );
        let outcome = sqlx::query(&query)
            .bind(TaskStatus::Succeeded.id())
            .bind(Json(result))
            .bind(usage_consumed)
            .bind(id)
            .bind(TaskStatus::Queued.id())
            .bind(TaskStatus::Running.id())
            .execute(pool)
            .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Apply the terminal `failed` state with an error class and detail.
    ///
    /// Same guard semantics as [`mark_succeeded`](Self::mark_succeeded).
    pub async fn mark_failed(
        pool: &DbPool,
        id: DbId,
        kind: FailureKind,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET status_id = ?, failure_kind = ?, error_message = ?, \
                 updated_at = {NOW} \
             WHERE id = ? AND status_id IN (?, ?)"
        );
        let outcome = sqlx::query(&query)
            .bind(TaskStatus::Failed.id())
            .bind(kind.as_str())
            .bind(message)
            .bind(id)
            .bind(TaskStatus::Queued.id())
            .bind(TaskStatus::Running.id())
            .execute(pool)
            .await?;
        Ok(outcome.rows_affected() > 0)
    }
}
