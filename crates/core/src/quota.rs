//! Daily quota arithmetic.
//!
//! Quota resets at midnight in a single fixed UTC offset for the whole
//! system, so "today" is deterministic regardless of where the process
//! runs. Remaining quota is clamped at zero: usage counters only grow and
//! must never surface as negative remaining.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::capability::Capability;

/// Default daily video token budget per account.
pub const DEFAULT_DAILY_VIDEO_TOKENS: i64 = 1_800_000;

/// Default daily produced-image budget per account (image + edit combined).
pub const DEFAULT_DAILY_IMAGES: i64 = 500;

/// Default quota day boundary offset from UTC, in hours (UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Per-account daily limits, shared by every account.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub daily_video_tokens: i64,
    pub daily_images: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily_video_tokens: DEFAULT_DAILY_VIDEO_TOKENS,
            daily_images: DEFAULT_DAILY_IMAGES,
        }
    }
}

impl QuotaLimits {
    /// The daily limit governing a capability. Image and edit draw from the
    /// same produced-image budget.
    pub fn limit_for(&self, capability: Capability) -> i64 {
        match capability {
            Capability::Video => self.daily_video_tokens,
            Capability::Image | Capability::Edit => self.daily_images,
        }
    }
}

/// Remaining quota, clamped at zero.
pub fn remaining(limit: i64, used: i64) -> i64 {
    (limit - used).max(0)
}

/// The calendar day a moment falls on under the system's fixed quota
/// timezone offset.
pub fn usage_day(now: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDate {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    now.with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn remaining_clamps_at_zero() {
        assert_eq!(remaining(100, 40), 60);
        assert_eq!(remaining(100, 100), 0);
        assert_eq!(remaining(100, 250), 0);
    }

    #[test]
    fn limit_for_capability() {
        let limits = QuotaLimits::default();
        assert_eq!(limits.limit_for(Capability::Video), DEFAULT_DAILY_VIDEO_TOKENS);
        assert_eq!(limits.limit_for(Capability::Image), DEFAULT_DAILY_IMAGES);
        assert_eq!(limits.limit_for(Capability::Edit), DEFAULT_DAILY_IMAGES);
    }

    #[test]
    fn usage_day_crosses_midnight_under_offset() {
        // 2026-03-01 20:30 UTC is already 2026-03-02 in UTC+8.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 20, 30, 0).unwrap();
        assert_eq!(
            usage_day(now, 8),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert_eq!(
            usage_day(now, 0),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
    }

    #[test]
    fn usage_day_with_negative_offset() {
        // 2026-03-01 02:00 UTC is still 2026-02-28 in UTC-5.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(
            usage_day(now, -5),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
        );
    }
}
