//! Account-choice policy and admission errors.
//!
//! The pick is greedy max-remaining, not round-robin: load deliberately
//! concentrates on the least-used account so any single request's burst has
//! the best chance of fitting inside one account's remaining budget. Ties
//! break to the lowest account id so repeated selections are deterministic.

use crate::capability::Capability;
use crate::types::DbId;

/// One eligible account with its remaining quota for the requested
/// capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCandidate {
    pub account_id: DbId,
    pub remaining: i64,
}

/// Pick the candidate with the strictly greatest remaining quota.
///
/// Candidates with nothing remaining are ignored. Returns `None` when every
/// candidate is exhausted (or the slice is empty); the caller turns that
/// into [`AdmissionError::QuotaExhausted`].
pub fn best_candidate(candidates: &[QuotaCandidate]) -> Option<DbId> {
    candidates
        .iter()
        .filter(|c| c.remaining > 0)
        // max_by_key keeps the later element on ties, so compare the
        // negated id to make the lowest id win.
        .max_by_key(|c| (c.remaining, -c.account_id))
        .map(|c| c.account_id)
}

/// Why a request was refused before any task record or provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Account {0} does not exist or is disabled")]
    AccountNotFound(DbId),

    #[error("Account '{account}' is not configured for {capability} generation")]
    CapabilityMissing {
        account: String,
        capability: Capability,
    },

    #[error("No active account is configured for {0} generation")]
    NoAccountsConfigured(Capability),

    #[error("Daily quota exhausted: need {needed}, {remaining} remaining")]
    QuotaExhausted { needed: i64, remaining: i64 },
}
