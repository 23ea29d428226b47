//! Task rows and DTOs.

use atelier_core::capability::{Capability, GenerationKind};
use atelier_core::task::{SubmitterIdentity, TaskParams, TaskResult};
use atelier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::{StatusId, TaskStatus};

/// A row from the `tasks` table.
///
/// `params` and `result` are typed payloads ([`TaskParams`]/[`TaskResult`])
/// stored as JSON text; serialization happens only at this boundary.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub public_id: String,
    pub account_id: DbId,
    pub capability: String,
    pub status_id: StatusId,
    pub generation_kind: String,
    pub params: Json<TaskParams>,
    pub result: Option<Json<TaskResult>>,
    pub usage_consumed: Option<i64>,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
    pub parent_task_id: Option<DbId>,
    pub submitted_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    pub fn capability(&self) -> Option<Capability> {
        Capability::parse(&self.capability)
    }

    pub fn status(&self) -> Option<TaskStatus> {
        TaskStatus::from_id(self.status_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().map(TaskStatus::is_terminal).unwrap_or(false)
    }

    pub fn submitter(&self) -> SubmitterIdentity {
        SubmitterIdentity::decode(&self.submitted_by)
    }
}

/// Input for inserting a new task row.
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub public_id: String,
    pub account_id: DbId,
    pub capability: Capability,
    pub status: TaskStatus,
    pub generation_kind: GenerationKind,
    pub params: TaskParams,
    /// For video: the estimated token cost charged at admission.
    pub usage_consumed: Option<i64>,
    pub parent_task_id: Option<DbId>,
    pub submitted_by: SubmitterIdentity,
}

/// Filters for task listing.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub account_id: Option<DbId>,
    /// Filter by status name (e.g. `succeeded`).
    pub status: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
}
