//! [`RewardStore`] backed by PostgreSQL.
//!
//! Settlement runs in a single database transaction; the event and profile
//! rows are taken with `SELECT ... FOR UPDATE`, so concurrent settlements of
//! the same event queue behind each other and the second sees it deleted.

use async_trait::async_trait;
use habitquest_core::models::{CompletedEvent, Event, Task, UserProfile};
use habitquest_core::store::{RewardStore, SettlementTx, StoreError};
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::{Postgres, Transaction};

use crate::repositories::{CompletedEventRepo, EventRepo, ProfileRepo, TaskRepo};
use crate::DbPool;

fn backend(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Database operation failed");
    StoreError::Backend(err.to_string())
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgRewardStore {
    pool: DbPool,
}

impl PgRewardStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RewardStore for PgRewardStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(backend)
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<bool, StoreError> {
        ProfileRepo::insert_if_missing(&self.pool, profile)
            .await
            .map_err(backend)
    }

    async fn get_profile(&self, id: RecordId) -> Result<Option<UserProfile>, StoreError> {
        let row = ProfileRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?;
        Ok(row.map(UserProfile::from))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<UserProfile>, StoreError> {
        let rows = ProfileRepo::list_by_weekly_coins(&self.pool, limit)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        TaskRepo::insert(&self.pool, task).await.map_err(backend)
    }

    async fn get_task(&self, id: RecordId) -> Result<Option<Task>, StoreError> {
        TaskRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?
            .map(Task::try_from)
            .transpose()
    }

    async fn list_tasks_by_owner(&self, owner_id: RecordId) -> Result<Vec<Task>, StoreError> {
        let rows = TaskRepo::list_by_owner(&self.pool, owner_id)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        EventRepo::insert(&self.pool, event).await.map_err(backend)
    }

    async fn get_event(&self, id: RecordId) -> Result<Option<Event>, StoreError> {
        EventRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?
            .map(Event::try_from)
            .transpose()
    }

    async fn list_events_by_owner(
        &self,
        owner_id: RecordId,
        window: Option<(Timestamp, Timestamp)>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = EventRepo::list_by_owner(&self.pool, owner_id, window)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn list_completed_by_owner(
        &self,
        owner_id: RecordId,
        limit: i64,
    ) -> Result<Vec<CompletedEvent>, StoreError> {
        let rows = CompletedEventRepo::list_by_owner(&self.pool, owner_id, limit)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn begin_settlement(&self) -> Result<Box<dyn SettlementTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(Box::new(PgSettlementTx { tx }))
    }
}

/// Open settlement transaction. Dropping it without [`commit`](SettlementTx::commit)
/// rolls back.
pub struct PgSettlementTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SettlementTx for PgSettlementTx {
    async fn lock_event(&mut self, id: RecordId) -> Result<Option<Event>, StoreError> {
        EventRepo::find_by_id_for_update(&mut *self.tx, id)
            .await
            .map_err(backend)?
            .map(Event::try_from)
            .transpose()
    }

    async fn lock_profile(&mut self, id: RecordId) -> Result<Option<UserProfile>, StoreError> {
        let row = ProfileRepo::find_by_id_for_update(&mut *self.tx, id)
            .await
            .map_err(backend)?;
        Ok(row.map(UserProfile::from))
    }

    async fn insert_completed_event(&mut self, entry: &CompletedEvent) -> Result<(), StoreError> {
        CompletedEventRepo::insert(&mut *self.tx, entry)
            .await
            .map_err(backend)
    }

    async fn update_profile(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        let updated = ProfileRepo::update_rewards(&mut *self.tx, profile)
            .await
            .map_err(backend)?;
        if !updated {
            return Err(StoreError::Backend(format!(
                "profile {} vanished mid-transaction",
                profile.id
            )));
        }
        Ok(())
    }

    async fn record_partial_settlement(
        &mut self,
        event_id: RecordId,
        settled_fraction: f64,
    ) -> Result<(), StoreError> {
        EventRepo::set_settled_fraction(&mut *self.tx, event_id, settled_fraction)
            .await
            .map_err(backend)
    }

    async fn delete_event(&mut self, event_id: RecordId) -> Result<(), StoreError> {
        EventRepo::delete(&mut *self.tx, event_id)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(backend)
    }
}
