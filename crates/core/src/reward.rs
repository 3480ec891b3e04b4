//! Reward curve: base rewards, per-event payouts and the level curve.
//!
//! Everything here is pure and deterministic. Duration only counts in whole
//! blocks (15 minutes for XP, 30 minutes for coins) and every single payout
//! is hard-capped, so an artificially long event cannot pay more than
//! [`MAX_EVENT_XP`] / [`MAX_EVENT_COINS`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lowest accepted energy cost.
pub const MIN_ENERGY: i32 = 1;

/// Highest accepted energy cost.
pub const MAX_ENERGY: i32 = 5;

/// Per-event XP ceiling.
pub const MAX_EVENT_XP: i32 = 100;

/// Per-event coin ceiling.
pub const MAX_EVENT_COINS: i32 = 30;

/// Multiplier applied when the caller has no bonus.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

const BASE_XP: i32 = 10;
const XP_PER_ENERGY: i32 = 5;
const MIN_BASE_XP: i32 = 5;

const BASE_COINS: i32 = 2;
const COINS_PER_ENERGY: i32 = 2;
const MIN_BASE_COINS: i32 = 1;

/// Seconds in one XP length block (15 minutes).
const XP_BLOCK_SECS: i64 = 15 * 60;
const XP_PER_BLOCK: i32 = 5;

/// Seconds in one coin length block (30 minutes).
const COIN_BLOCK_SECS: i64 = 30 * 60;
const COINS_PER_BLOCK: i32 = 2;

/// XP needed to clear level 1.
const LEVEL_BASE_XP: f64 = 100.0;
const LEVEL_GROWTH: f64 = 1.14;

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// How often a task recurs. Rarer tasks pay a larger bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Once,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    fn bonus_xp(self) -> i32 {
        match self {
            Frequency::Once => 5,
            Frequency::Daily => 0,
            Frequency::Weekly => 10,
            Frequency::Monthly => 20,
        }
    }

    fn bonus_coins(self) -> i32 {
        match self {
            Frequency::Once => 2,
            Frequency::Daily => 0,
            Frequency::Weekly => 4,
            Frequency::Monthly => 8,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "Unknown frequency '{s}'. Expected one of: once, daily, weekly, monthly"
                ))
            })
    }
}

/// Reject energy costs outside `MIN_ENERGY..=MAX_ENERGY`.
pub fn validate_energy(energy: i32) -> Result<(), CoreError> {
    if (MIN_ENERGY..=MAX_ENERGY).contains(&energy) {
        Ok(())
    } else {
        Err(CoreError::InvalidInput(format!(
            "Energy must be between {MIN_ENERGY} and {MAX_ENERGY}, got {energy}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Base rewards (fixed at task creation)
// ---------------------------------------------------------------------------

/// Base XP for a task, before duration and completion are applied.
pub fn base_xp(frequency: Frequency, energy: i32) -> i32 {
    (BASE_XP + energy * XP_PER_ENERGY + frequency.bonus_xp()).clamp(MIN_BASE_XP, MAX_EVENT_XP)
}

/// Base coins for a task, before duration and completion are applied.
pub fn base_coins(frequency: Frequency, energy: i32) -> i32 {
    (BASE_COINS + energy * COINS_PER_ENERGY + frequency.bonus_coins())
        .clamp(MIN_BASE_COINS, MAX_EVENT_COINS)
}

// ---------------------------------------------------------------------------
// Final payouts
// ---------------------------------------------------------------------------

/// XP paid for an event of `length_seconds` completed to `completion`.
///
/// `completion` is clamped to `[0, 1]`; NaN pays nothing.
pub fn final_xp(base_xp: i32, length_seconds: i64, completion: f64, multiplier: f64) -> i32 {
    let raw = with_length_blocks(base_xp, length_seconds, XP_BLOCK_SECS, XP_PER_BLOCK);
    scaled_payout(raw, completion, multiplier, MAX_EVENT_XP)
}

/// Coins paid for an event of `length_seconds` completed to `completion`.
pub fn final_coins(base_coins: i32, length_seconds: i64, completion: f64, multiplier: f64) -> i32 {
    let raw = with_length_blocks(base_coins, length_seconds, COIN_BLOCK_SECS, COINS_PER_BLOCK);
    scaled_payout(raw, completion, multiplier, MAX_EVENT_COINS)
}

fn with_length_blocks(base: i32, length_seconds: i64, block_secs: i64, per_block: i32) -> f64 {
    let blocks = length_seconds.max(0) / block_secs;
    f64::from(base) + blocks as f64 * f64::from(per_block)
}

fn scaled_payout(raw: f64, completion: f64, multiplier: f64, cap: i32) -> i32 {
    let total = (raw * multiplier * clamp_fraction(completion)).floor();
    // `as` saturates, so an absurd multiplier still lands inside the clamp.
    (total as i32).clamp(0, cap)
}

/// Clamp a completion fraction to `[0, 1]`, mapping NaN to zero.
pub fn clamp_fraction(completion: f64) -> f64 {
    if completion.is_nan() {
        0.0
    } else {
        completion.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Level curve
// ---------------------------------------------------------------------------

/// XP needed to clear `level` (level 1 needs 100, growing 14% per level).
pub fn required_xp(level: i32) -> i64 {
    let exponent = f64::from(level.max(1) - 1);
    (LEVEL_BASE_XP * LEVEL_GROWTH.powf(exponent)).floor() as i64
}

/// Level reached with `total_xp` lifetime XP. Always at least 1.
pub fn level_for_xp(total_xp: i64) -> i32 {
    level_progress(total_xp).level
}

/// Where a lifetime XP total sits on the level curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: i32,
    /// XP accumulated past the last cleared threshold.
    pub xp_into_level: i64,
    /// XP the current level needs in total to clear.
    pub xp_for_next_level: i64,
}

/// Greedily consume thresholds from `total_xp` until the next one no longer fits.
pub fn level_progress(total_xp: i64) -> LevelProgress {
    let mut level = 1;
    let mut remaining = total_xp.max(0);
    loop {
        let needed = required_xp(level);
        if remaining < needed {
            return LevelProgress {
                level,
                xp_into_level: remaining,
                xp_for_next_level: needed,
            };
        }
        remaining -= needed;
        level += 1;
    }
}
