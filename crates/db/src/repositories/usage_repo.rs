//! Repository for the `daily_usages` table — the quota ledger.
//!
//! Concurrent dispatch paths charge the same `(account, day)` row, so the
//! charge is a single upsert statement: the increment happens inside the
//! database, never as an application-side read-then-write that could lose
//! an update.

use atelier_core::capability::Capability;
use atelier_core::types::DbId;
use chrono::NaiveDate;

use crate::models::daily_usage::DailyUsage;
use crate::DbPool;

/// Consumption counters for one `(account, day)` key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsedQuota {
    pub tokens: i64,
    pub images: i64,
}

pub struct UsageRepo;

impl UsageRepo {
    /// Counters for an account on a day; zeros when no row exists yet.
    pub async fn used(
        pool: &DbPool,
        account_id: DbId,
        day: NaiveDate,
    ) -> Result<UsedQuota, sqlx::Error> {
        let row = sqlx::query_as::<_, DailyUsage>(
            "SELECT id, account_id, usage_date, used_tokens, used_images \
             FROM daily_usages WHERE account_id = ? AND usage_date = ?",
        )
        .bind(account_id)
        .bind(day)
        .fetch_optional(pool)
        .await?;

        Ok(row
            .map(|u| UsedQuota {
                tokens: u.used_tokens,
                images: u.used_images,
            })
            .unwrap_or_default())
    }

    /// Atomically add `amount` to the counter metering `capability`.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` creates the day row
    /// lazily and increments it in one statement, so N concurrent charges
    /// to the same key always sum exactly. `amount` must not be negative:
    /// counters are monotonically non-decreasing within a day.
    pub async fn charge(
        pool: &DbPool,
        account_id: DbId,
        day: NaiveDate,
        capability: Capability,
        amount: i64,
    ) -> Result<(), sqlx::Error> {
        debug_assert!(amount >= 0, "usage counters only grow");
        if amount == 0 {
            return Ok(());
        }

        let (tokens, images) = if capability.metered_in_tokens() {
            (amount, 0)
        } else {
            (0, amount)
        };

        sqlx::query(
            "INSERT INTO daily_usages (account_id, usage_date, used_tokens, used_images) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(account_id, usage_date) DO UPDATE SET \
                 used_tokens = used_tokens + excluded.used_tokens, \
                 used_images = used_images + excluded.used_images",
        )
        .bind(account_id)
        .bind(day)
        .bind(tokens)
        .bind(images)
        .execute(pool)
        .await?;

        Ok(())
    }
}
