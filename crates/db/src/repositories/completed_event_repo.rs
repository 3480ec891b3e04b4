//! Repository for the append-only `completed_events` ledger.
//!
//! Rows are only ever inserted.

use habitquest_core::models::CompletedEvent;
use habitquest_core::types::RecordId;
use sqlx::PgExecutor;

use crate::models::completed_event::CompletedEventRow;

/// Column list for `completed_events` queries.
const COLUMNS: &str = "id, owner_id, event_id, completed_at, completion_fraction, reward_xp, \
                       reward_coins, completed_length_seconds, title, category, energy";

pub struct CompletedEventRepo;

impl CompletedEventRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        entry: &CompletedEvent,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO completed_events \
                (id, owner_id, event_id, completed_at, completion_fraction, reward_xp, \
                 reward_coins, completed_length_seconds, title, category, energy) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.id)
        .bind(entry.owner_id)
        .bind(entry.event_id)
        .bind(entry.completed_at)
        .bind(entry.completion_fraction)
        .bind(entry.reward_xp)
        .bind(entry.reward_coins)
        .bind(entry.completed_length_seconds)
        .bind(&entry.title)
        .bind(entry.category.as_str())
        .bind(entry.energy)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Ledger entries for `owner_id`, newest first.
    pub async fn list_by_owner<'e, E: PgExecutor<'e>>(
        executor: E,
        owner_id: RecordId,
        limit: i64,
    ) -> Result<Vec<CompletedEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM completed_events \
             WHERE owner_id = $1 ORDER BY completed_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, CompletedEventRow>(&query)
            .bind(owner_id)
            .bind(limit)
            .fetch_all(executor)
            .await
    }
}
