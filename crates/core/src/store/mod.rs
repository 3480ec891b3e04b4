//! Row-store contract for tasks, events, profiles and the ledger.
//!
//! Plain reads and inserts go straight through [`RewardStore`]. Settlement
//! runs inside a [`SettlementTx`]: every read and write between
//! [`RewardStore::begin_settlement`] and [`SettlementTx::commit`] is applied
//! atomically, and dropping the transaction without committing discards it.

pub mod memory;

use async_trait::async_trait;

use crate::models::{CompletedEvent, Event, Task, UserProfile};
use crate::types::{RecordId, Timestamp};

pub use memory::MemoryRewardStore;

/// Failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not complete the operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored row could not be mapped onto a domain record.
    #[error("Unexpected data shape: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Cheap reachability check used by the health endpoint.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Insert `profile` unless one already exists. Returns `true` if inserted.
    async fn insert_profile(&self, profile: &UserProfile) -> Result<bool, StoreError>;
    async fn get_profile(&self, id: RecordId) -> Result<Option<UserProfile>, StoreError>;
    /// Profiles ordered by weekly coins, highest first.
    async fn leaderboard(&self, limit: i64) -> Result<Vec<UserProfile>, StoreError>;

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;
    async fn get_task(&self, id: RecordId) -> Result<Option<Task>, StoreError>;
    async fn list_tasks_by_owner(&self, owner_id: RecordId) -> Result<Vec<Task>, StoreError>;

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;
    async fn get_event(&self, id: RecordId) -> Result<Option<Event>, StoreError>;
    /// Events for `owner_id` ordered by schedule, optionally limited to `[from, to)`.
    async fn list_events_by_owner(
        &self,
        owner_id: RecordId,
        window: Option<(Timestamp, Timestamp)>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Ledger entries for `owner_id`, newest first.
    async fn list_completed_by_owner(
        &self,
        owner_id: RecordId,
        limit: i64,
    ) -> Result<Vec<CompletedEvent>, StoreError>;

    /// Open the transaction a single settlement runs in.
    async fn begin_settlement(&self) -> Result<Box<dyn SettlementTx>, StoreError>;
}

/// One settlement's unit of work.
///
/// `lock_*` reads hold their rows until commit, so two settlements touching
/// the same event or profile are serialized.
#[async_trait]
pub trait SettlementTx: Send {
    async fn lock_event(&mut self, id: RecordId) -> Result<Option<Event>, StoreError>;
    async fn lock_profile(&mut self, id: RecordId) -> Result<Option<UserProfile>, StoreError>;
    async fn insert_completed_event(&mut self, entry: &CompletedEvent) -> Result<(), StoreError>;
    async fn update_profile(&mut self, profile: &UserProfile) -> Result<(), StoreError>;
    async fn record_partial_settlement(
        &mut self,
        event_id: RecordId,
        settled_fraction: f64,
    ) -> Result<(), StoreError>;
    async fn delete_event(&mut self, event_id: RecordId) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
