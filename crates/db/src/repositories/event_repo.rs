//! Repository for the `events` table.

use habitquest_core::models::Event;
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::PgExecutor;

use crate::models::event::EventRow;

/// Column list for `events` queries.
const COLUMNS: &str = "id, owner_id, task_id, title, description, scheduled_at, \
                       length_seconds, category, energy, base_xp, base_coins, \
                       settled_fraction, created_at";

pub struct EventRepo;

impl EventRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        event: &Event,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO events \
                (id, owner_id, task_id, title, description, scheduled_at, length_seconds, \
                 category, energy, base_xp, base_coins, settled_fraction, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(event.id)
        .bind(event.owner_id)
        .bind(event.task_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.scheduled_at)
        .bind(event.length_seconds)
        .bind(event.category.as_str())
        .bind(event.energy)
        .bind(event.base_xp)
        .bind(event.base_coins)
        .bind(event.settled_fraction)
        .bind(event.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Row-locking read used by settlement.
    pub async fn find_by_id_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<Option<EventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, EventRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Events owned by `owner_id` ordered by schedule, optionally within `[from, to)`.
    pub async fn list_by_owner<'e, E: PgExecutor<'e>>(
        executor: E,
        owner_id: RecordId,
        window: Option<(Timestamp, Timestamp)>,
    ) -> Result<Vec<EventRow>, sqlx::Error> {
        let (from, to) = window.unzip();
        let query = format!(
            "SELECT {COLUMNS} FROM events \
             WHERE owner_id = $1 \
               AND ($2::timestamptz IS NULL OR scheduled_at >= $2) \
               AND ($3::timestamptz IS NULL OR scheduled_at < $3) \
             ORDER BY scheduled_at ASC"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(owner_id)
            .bind(from)
            .bind(to)
            .fetch_all(executor)
            .await
    }

    pub async fn set_settled_fraction<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
        settled_fraction: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET settled_fraction = $2 WHERE id = $1")
            .bind(id)
            .bind(settled_fraction)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Hard-delete an event. Returns `true` if a row was removed.
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
