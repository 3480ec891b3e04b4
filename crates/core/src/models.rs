//! Domain records: tasks, events, profiles and the completion ledger.
//!
//! These are storage-agnostic. The Postgres row types in `habitquest-db`
//! convert into them.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoreError;
use crate::reward::{self, Frequency};
use crate::types::{RecordId, Timestamp};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Health,
    Learning,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Work,
        Category::Personal,
        Category::Health,
        Category::Learning,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Health => "health",
            Category::Learning => "learning",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("Unknown category '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A template for recurring or one-off work. Rewards are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub title: String,
    pub description: String,
    pub length_seconds: i64,
    pub category: Category,
    pub frequency: Frequency,
    pub energy: i32,
    pub base_xp: i32,
    pub base_coins: i32,
    pub created_at: Timestamp,
}

/// Input for creating a task.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: String,
    #[validate(range(min = 1, max = 480, message = "length_minutes must be between 1 and 480"))]
    pub length_minutes: i64,
    pub category: String,
    pub frequency: String,
    #[validate(range(min = 1, max = 5, message = "energy must be between 1 and 5"))]
    pub energy: i32,
}

impl Task {
    /// Validate `input` and build a task owned by `owner_id`, deriving its base rewards.
    pub fn create(owner_id: RecordId, input: CreateTask, now: Timestamp) -> Result<Self, CoreError> {
        input
            .validate()
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::InvalidInput("title must not be blank".into()));
        }
        let category: Category = input.category.parse()?;
        let frequency: Frequency = input.frequency.parse()?;
        reward::validate_energy(input.energy)?;

        Ok(Task {
            id: Uuid::new_v4(),
            owner_id,
            title,
            description: input.description,
            length_seconds: input.length_minutes * 60,
            category,
            frequency,
            energy: input.energy,
            base_xp: reward::base_xp(frequency, input.energy),
            base_coins: reward::base_coins(frequency, input.energy),
            created_at: now,
        })
    }

    /// Schedule a completable event from this task.
    pub fn schedule(&self, scheduled_at: Timestamp, now: Timestamp) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            task_id: Some(self.id),
            title: self.title.clone(),
            description: self.description.clone(),
            scheduled_at,
            length_seconds: self.length_seconds,
            category: self.category,
            energy: self.energy,
            base_xp: self.base_xp,
            base_coins: self.base_coins,
            settled_fraction: None,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A scheduled, completable instance of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub task_id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub scheduled_at: Timestamp,
    pub length_seconds: i64,
    pub category: Category,
    pub energy: i32,
    pub base_xp: i32,
    pub base_coins: i32,
    /// Highest fraction already settled; `None` until the first partial settlement.
    pub settled_fraction: Option<f64>,
    pub created_at: Timestamp,
}

/// Bounds of the UTC day containing `now`, as a half-open `[start, end)` range.
pub fn utc_day_bounds(now: Timestamp) -> (Timestamp, Timestamp) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Durable reward state for one user. `level` caches `level_for_xp(xp)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: RecordId,
    pub name: String,
    pub xp: i64,
    pub level: i32,
    pub coins: i64,
    pub weekly_coins: i64,
    pub xp_earned_today: i64,
    pub last_xp_award_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserProfile {
    /// A fresh profile with no rewards.
    pub fn new(id: RecordId, name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            xp: 0,
            level: reward::level_for_xp(0),
            coins: 0,
            weekly_coins: 0,
            xp_earned_today: 0,
            last_xp_award_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Immutable record of one settlement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedEvent {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub event_id: RecordId,
    pub completed_at: Timestamp,
    pub completion_fraction: f64,
    pub reward_xp: i64,
    pub reward_coins: i64,
    /// `round(length_seconds * completion_fraction)` of the source event.
    pub completed_length_seconds: i64,
    pub title: String,
    pub category: Category,
    pub energy: i32,
}
