//! Daily XP cap, measured in UTC calendar days.
//!
//! The counter is only trusted when the last award happened on the same UTC
//! day as "now"; otherwise it is treated as zero before the cap is applied.
//! Coins are never capped.

use crate::types::Timestamp;

/// Maximum XP a user may earn within one UTC calendar day.
pub const DAILY_XP_CAP: i64 = 200;

/// Result of applying the cap to one award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapOutcome {
    /// XP actually granted (never more than was computed).
    pub granted_xp: i64,
    /// Counter to store: post-reset value plus `granted_xp`.
    pub xp_earned_today: i64,
    /// Always "now", even when nothing was granted.
    pub last_xp_award_at: Timestamp,
}

/// Whether two instants fall on the same UTC calendar day.
pub fn is_same_utc_day(a: Timestamp, b: Timestamp) -> bool {
    a.date_naive() == b.date_naive()
}

/// The earned-today counter as it stands at `now`, after any day reset.
pub fn effective_earned_today(
    xp_earned_today: i64,
    last_xp_award_at: Option<Timestamp>,
    now: Timestamp,
) -> i64 {
    match last_xp_award_at {
        Some(last) if is_same_utc_day(last, now) => xp_earned_today.max(0),
        _ => 0,
    }
}

/// XP that may still be granted today.
pub fn remaining_capacity(
    xp_earned_today: i64,
    last_xp_award_at: Option<Timestamp>,
    now: Timestamp,
) -> i64 {
    (DAILY_XP_CAP - effective_earned_today(xp_earned_today, last_xp_award_at, now)).max(0)
}

/// Cap `computed_xp` against today's remaining capacity.
pub fn apply_daily_cap(
    computed_xp: i64,
    xp_earned_today: i64,
    last_xp_award_at: Option<Timestamp>,
    now: Timestamp,
) -> CapOutcome {
    let earned = effective_earned_today(xp_earned_today, last_xp_award_at, now);
    let granted_xp = computed_xp.max(0).min((DAILY_XP_CAP - earned).max(0));
    CapOutcome {
        granted_xp,
        xp_earned_today: earned + granted_xp,
        last_xp_award_at: now,
    }
}
