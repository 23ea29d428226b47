//! Per-account, per-day consumption counters.

use atelier_core::types::DbId;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `daily_usages` table.
///
/// Keyed by `(account_id, usage_date)` where the date is computed under the
/// system's fixed quota timezone offset. Created lazily on first charge,
/// never deleted, and only ever incremented — all through
/// [`UsageRepo::charge`](crate::repositories::UsageRepo::charge).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyUsage {
    pub id: DbId,
    pub account_id: DbId,
    pub usage_date: NaiveDate,
    pub used_tokens: i64,
    pub used_images: i64,
}
