//! `tasks` rows.

use habitquest_core::models::Task;
use habitquest_core::store::StoreError;
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::FromRow;

use super::parse_column;

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub title: String,
    pub description: String,
    pub length_seconds: i64,
    pub category: String,
    pub frequency: String,
    pub energy: i32,
    pub base_xp: i32,
    pub base_coins: i32,
    pub created_at: Timestamp,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            length_seconds: row.length_seconds,
            category: parse_column("tasks.category", &row.category)?,
            frequency: parse_column("tasks.frequency", &row.frequency)?,
            energy: row.energy,
            base_xp: row.base_xp,
            base_coins: row.base_coins,
            created_at: row.created_at,
        })
    }
}
