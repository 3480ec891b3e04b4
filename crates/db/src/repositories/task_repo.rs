//! Repository for the `tasks` table.

use habitquest_core::models::Task;
use habitquest_core::types::RecordId;
use sqlx::PgExecutor;

use crate::models::task::TaskRow;

/// Column list for `tasks` queries.
const COLUMNS: &str = "id, owner_id, title, description, length_seconds, category, \
                       frequency, energy, base_xp, base_coins, created_at";

pub struct TaskRepo;

impl TaskRepo {
    pub async fn insert<'e, E: PgExecutor<'e>>(executor: E, task: &Task) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tasks \
                (id, owner_id, title, description, length_seconds, category, \
                 frequency, energy, base_xp, base_coins, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(task.id)
        .bind(task.owner_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.length_seconds)
        .bind(task.category.as_str())
        .bind(task.frequency.as_str())
        .bind(task.energy)
        .bind(task.base_xp)
        .bind(task.base_coins)
        .bind(task.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// All tasks owned by `owner_id`, oldest first.
    pub async fn list_by_owner<'e, E: PgExecutor<'e>>(
        executor: E,
        owner_id: RecordId,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM tasks WHERE owner_id = $1 ORDER BY created_at ASC");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(owner_id)
            .fetch_all(executor)
            .await
    }
}
