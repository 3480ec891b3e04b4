//! `events` rows.

use habitquest_core::models::Event;
use habitquest_core::store::StoreError;
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::FromRow;

use super::parse_column;

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub task_id: Option<RecordId>,
    pub title: String,
    pub description: String,
    pub scheduled_at: Timestamp,
    pub length_seconds: i64,
    pub category: String,
    pub energy: i32,
    pub base_xp: i32,
    pub base_coins: i32,
    pub settled_fraction: Option<f64>,
    pub created_at: Timestamp,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            owner_id: row.owner_id,
            task_id: row.task_id,
            title: row.title,
            description: row.description,
            scheduled_at: row.scheduled_at,
            length_seconds: row.length_seconds,
            category: parse_column("events.category", &row.category)?,
            energy: row.energy,
            base_xp: row.base_xp,
            base_coins: row.base_coins,
            settled_fraction: row.settled_fraction,
            created_at: row.created_at,
        })
    }
}
