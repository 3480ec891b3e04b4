//! `completed_events` rows (the ledger).

use habitquest_core::models::CompletedEvent;
use habitquest_core::store::StoreError;
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::FromRow;

use super::parse_column;

#[derive(Debug, Clone, FromRow)]
pub struct CompletedEventRow {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub event_id: RecordId,
    pub completed_at: Timestamp,
    pub completion_fraction: f64,
    pub reward_xp: i64,
    pub reward_coins: i64,
    pub completed_length_seconds: i64,
    pub title: String,
    pub category: String,
    pub energy: i32,
}

impl TryFrom<CompletedEventRow> for CompletedEvent {
    type Error = StoreError;

    fn try_from(row: CompletedEventRow) -> Result<Self, Self::Error> {
        Ok(CompletedEvent {
            id: row.id,
            owner_id: row.owner_id,
            event_id: row.event_id,
            completed_at: row.completed_at,
            completion_fraction: row.completion_fraction,
            reward_xp: row.reward_xp,
            reward_coins: row.reward_coins,
            completed_length_seconds: row.completed_length_seconds,
            title: row.title,
            category: parse_column("completed_events.category", &row.category)?,
            energy: row.energy,
        })
    }
}
