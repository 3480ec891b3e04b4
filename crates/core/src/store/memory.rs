//! In-process [`RewardStore`] for tests and single-node development.
//!
//! A settlement holds the store-wide async mutex for its whole lifetime and
//! writes into a staged copy of the state; commit swaps the copy in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RewardStore, SettlementTx, StoreError};
use crate::models::{CompletedEvent, Event, Task, UserProfile};
use crate::types::{RecordId, Timestamp};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    profiles: HashMap<RecordId, UserProfile>,
    tasks: HashMap<RecordId, Task>,
    events: HashMap<RecordId, Event>,
    ledger: Vec<CompletedEvent>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryRewardStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent settlement commit fail with a backend error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RewardStore for MemoryRewardStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_profile(&self, profile: &UserProfile) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.profiles.contains_key(&profile.id) {
            return Ok(false);
        }
        state.profiles.insert(profile.id, profile.clone());
        Ok(true)
    }

    async fn get_profile(&self, id: RecordId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.state.lock().await.profiles.get(&id).cloned())
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<UserProfile>, StoreError> {
        let state = self.state.lock().await;
        let mut profiles: Vec<_> = state.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| {
            b.weekly_coins
                .cmp(&a.weekly_coins)
                .then_with(|| a.name.cmp(&b.name))
        });
        profiles.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(profiles)
    }

    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.state.lock().await.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: RecordId) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list_tasks_by_owner(&self, owner_id: RecordId) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<_> = state
            .tasks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        self.state.lock().await.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: RecordId) -> Result<Option<Event>, StoreError> {
        Ok(self.state.lock().await.events.get(&id).cloned())
    }

    async fn list_events_by_owner(
        &self,
        owner_id: RecordId,
        window: Option<(Timestamp, Timestamp)>,
    ) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter(|e| e.owner_id == owner_id)
            .filter(|e| match window {
                Some((from, to)) => e.scheduled_at >= from && e.scheduled_at < to,
                None => true,
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.scheduled_at);
        Ok(events)
    }

    async fn list_completed_by_owner(
        &self,
        owner_id: RecordId,
        limit: i64,
    ) -> Result<Vec<CompletedEvent>, StoreError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|c| c.owner_id == owner_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn begin_settlement(&self) -> Result<Box<dyn SettlementTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemorySettlementTx {
            guard,
            staged,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

struct MemorySettlementTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_commit: bool,
}

#[async_trait]
impl SettlementTx for MemorySettlementTx {
    async fn lock_event(&mut self, id: RecordId) -> Result<Option<Event>, StoreError> {
        Ok(self.staged.events.get(&id).cloned())
    }

    async fn lock_profile(&mut self, id: RecordId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.staged.profiles.get(&id).cloned())
    }

    async fn insert_completed_event(&mut self, entry: &CompletedEvent) -> Result<(), StoreError> {
        self.staged.ledger.push(entry.clone());
        Ok(())
    }

    async fn update_profile(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        match self.staged.profiles.get_mut(&profile.id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "profile {} vanished mid-transaction",
                profile.id
            ))),
        }
    }

    async fn record_partial_settlement(
        &mut self,
        event_id: RecordId,
        settled_fraction: f64,
    ) -> Result<(), StoreError> {
        if let Some(event) = self.staged.events.get_mut(&event_id) {
            event.settled_fraction = Some(settled_fraction);
        }
        Ok(())
    }

    async fn delete_event(&mut self, event_id: RecordId) -> Result<(), StoreError> {
        self.staged.events.remove(&event_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Backend("commit rejected".into()));
        }
        let MemorySettlementTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
