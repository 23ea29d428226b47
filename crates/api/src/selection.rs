//! Account selection under daily quota constraints.
//!
//! The request path calls [`select_account`] before any task row or
//! provider call exists; a refusal here is an [`AdmissionError`] and the
//! request ends with nothing to clean up.

use atelier_core::capability::Capability;
use atelier_core::quota;
use atelier_core::selection::{best_candidate, AdmissionError, QuotaCandidate};
use atelier_core::types::DbId;
use chrono::Utc;
use serde::Serialize;

use atelier_db::models::account::Account;
use atelier_db::repositories::{AccountRepo, UsageRepo};
use atelier_db::DbPool;

use crate::config::QuotaConfig;
use crate::error::AppResult;

/// Remaining quota for one account and capability, as of today.
async fn remaining_for(
    pool: &DbPool,
    config: &QuotaConfig,
    account_id: DbId,
    capability: Capability,
) -> Result<i64, sqlx::Error> {
    let day = quota::usage_day(Utc::now(), config.utc_offset_hours);
    let used = UsageRepo::used(pool, account_id, day).await?;
    let used = if capability.metered_in_tokens() {
        used.tokens
    } else {
        used.images
    };
    Ok(quota::remaining(config.limits.limit_for(capability), used))
}

/// Pick the account a request will run on.
///
/// With an explicit id: the account must exist, be active, carry the
/// capability's configuration, and have quota remaining. Without one: the
/// active, capability-configured account with the greatest remaining quota
/// wins (ties break to the lowest id).
pub async fn select_account(
    pool: &DbPool,
    config: &QuotaConfig,
    capability: Capability,
    explicit_id: Option<DbId>,
) -> AppResult<Account> {
    if let Some(id) = explicit_id {
        let account = AccountRepo::find_by_id(pool, id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AdmissionError::AccountNotFound(id))?;

        if !account.supports(capability) {
            return Err(AdmissionError::CapabilityMissing {
                account: account.name,
                capability,
            }
            .into());
        }

        let remaining = remaining_for(pool, config, account.id, capability).await?;
        if remaining <= 0 {
            return Err(AdmissionError::QuotaExhausted {
                needed: 1,
                remaining,
            }
            .into());
        }

        return Ok(account);
    }

    let candidates: Vec<Account> = AccountRepo::list_active(pool)
        .await?
        .into_iter()
        .filter(|a| a.supports(capability))
        .collect();

    if candidates.is_empty() {
        return Err(AdmissionError::NoAccountsConfigured(capability).into());
    }

    let mut quotas = Vec::with_capacity(candidates.len());
    for account in &candidates {
        quotas.push(QuotaCandidate {
            account_id: account.id,
            remaining: remaining_for(pool, config, account.id, capability).await?,
        });
    }

    let picked = best_candidate(&quotas).ok_or(AdmissionError::QuotaExhausted {
        needed: 1,
        remaining: 0,
    })?;

    Ok(candidates
        .into_iter()
        .find(|a| a.id == picked)
        .expect("picked id comes from the candidate list"))
}

/// Require at least `needed` remaining quota on an already selected
/// account; used by video admission where the cost is estimated up front.
pub async fn require_quota(
    pool: &DbPool,
    config: &QuotaConfig,
    account: &Account,
    capability: Capability,
    needed: i64,
) -> AppResult<()> {
    let remaining = remaining_for(pool, config, account.id, capability).await?;
    if needed > remaining {
        return Err(AdmissionError::QuotaExhausted { needed, remaining }.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quota reporting
// ---------------------------------------------------------------------------

/// Usage standing for one capability budget.
#[derive(Debug, Serialize)]
pub struct QuotaStanding {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
}

/// One account with its capability flags and remaining budgets.
#[derive(Debug, Serialize)]
pub struct AccountQuota {
    pub account_id: DbId,
    pub name: String,
    pub has_video: bool,
    pub has_image: bool,
    pub has_edit: bool,
    pub video_tokens: QuotaStanding,
    pub images: QuotaStanding,
}

/// Every active account with today's remaining quota per capability.
pub async fn accounts_with_quota(
    pool: &DbPool,
    config: &QuotaConfig,
) -> Result<Vec<AccountQuota>, sqlx::Error> {
    let day = quota::usage_day(Utc::now(), config.utc_offset_hours);
    let accounts = AccountRepo::list_active(pool).await?;

    let mut report = Vec::with_capacity(accounts.len());
    for account in accounts {
        let used = UsageRepo::used(pool, account.id, day).await?;
        report.push(AccountQuota {
            account_id: account.id,
            has_video: account.supports(Capability::Video),
            has_image: account.supports(Capability::Image),
            has_edit: account.supports(Capability::Edit),
            video_tokens: QuotaStanding {
                limit: config.limits.daily_video_tokens,
                used: used.tokens,
                remaining: quota::remaining(config.limits.daily_video_tokens, used.tokens),
            },
            images: QuotaStanding {
                limit: config.limits.daily_images,
                used: used.images,
                remaining: quota::remaining(config.limits.daily_images, used.images),
            },
            name: account.name,
        });
    }

    Ok(report)
}
