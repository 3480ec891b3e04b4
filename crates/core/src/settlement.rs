//! Settlement: the only place reward state is written.
//!
//! [`settle`] turns one completion signal into ledger, profile and event
//! mutations inside a single store transaction:
//!
//! 1. Lock the event (`NotFound` if absent, including "already settled").
//! 2. Check the caller owns it (`Forbidden`).
//! 3. Lock the owner's profile (`NotFound`).
//! 4. Compute XP and coins on the reward curve.
//! 5. Apply the daily XP cap.
//! 6. Derive new totals and the level.
//! 7. Append the ledger entry.
//! 8. Update the profile.
//! 9. Delete the event on full completion, otherwise record how far it got.
//!
//! Partial settlements are incremental: a later settlement of the same event
//! must reach further than the last one and only pays the difference, so an
//! event never pays more in total than a single full completion would.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::daily_cap;
use crate::error::CoreError;
use crate::models::{CompletedEvent, Event, UserProfile};
use crate::reward::{self, DEFAULT_MULTIPLIER};
use crate::store::RewardStore;
use crate::types::RecordId;

/// A request to settle `event_id` at `completion_fraction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub event_id: RecordId,
    pub completion_fraction: f64,
}

/// What a successful settlement granted and the resulting totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementOutcome {
    pub ledger_id: RecordId,
    pub granted_xp: i64,
    pub coins: i64,
    pub new_xp_total: i64,
    pub new_level: i32,
    pub new_coins: i64,
    pub new_weekly_coins: i64,
    /// Whether the event was fully consumed and deleted.
    pub event_retired: bool,
}

/// Reject fractions that are not finite or fall outside `[0, 1]`.
pub fn validate_fraction(completion_fraction: f64) -> Result<f64, CoreError> {
    if completion_fraction.is_finite() && (0.0..=1.0).contains(&completion_fraction) {
        Ok(completion_fraction)
    } else {
        Err(CoreError::InvalidInput(format!(
            "completionPercentage must be between 0 and 1, got {completion_fraction}"
        )))
    }
}

/// Raw (uncapped) XP and coins owed for taking `event` to `completion_fraction`.
///
/// Rewards already paid for earlier partial settlements are subtracted.
pub fn rewards_owed(event: &Event, completion_fraction: f64) -> (i64, i64) {
    let payout = |fraction: f64| {
        (
            i64::from(reward::final_xp(
                event.base_xp,
                event.length_seconds,
                fraction,
                DEFAULT_MULTIPLIER,
            )),
            i64::from(reward::final_coins(
                event.base_coins,
                event.length_seconds,
                fraction,
                DEFAULT_MULTIPLIER,
            )),
        )
    };
    let (xp, coins) = payout(completion_fraction);
    match event.settled_fraction {
        Some(previous) => {
            let (paid_xp, paid_coins) = payout(previous);
            ((xp - paid_xp).max(0), (coins - paid_coins).max(0))
        }
        None => (xp, coins),
    }
}

/// Settle one completion for `caller_id`. See the module docs for the steps.
pub async fn settle(
    store: &dyn RewardStore,
    clock: &dyn Clock,
    caller_id: RecordId,
    request: SettlementRequest,
) -> Result<SettlementOutcome, CoreError> {
    let fraction = validate_fraction(request.completion_fraction)?;
    let mut tx = store.begin_settlement().await?;

    // 1-2. Event exists and belongs to the caller.
    let event = tx
        .lock_event(request.event_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Event",
            id: request.event_id,
        })?;
    if event.owner_id != caller_id {
        return Err(CoreError::Forbidden(
            "Not allowed to complete this event".into(),
        ));
    }
    if let Some(previous) = event.settled_fraction {
        if fraction <= previous {
            return Err(CoreError::Conflict(format!(
                "Event already settled up to {previous}; a new settlement must go further"
            )));
        }
    }

    // 3. Owner profile.
    let profile = tx
        .lock_profile(caller_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "UserProfile",
            id: caller_id,
        })?;

    // 4-6. Rewards, cap and new totals.
    let now = clock.now();
    let (raw_xp, coins) = rewards_owed(&event, fraction);
    let cap = daily_cap::apply_daily_cap(
        raw_xp,
        profile.xp_earned_today,
        profile.last_xp_award_at,
        now,
    );
    let new_xp_total = profile.xp + cap.granted_xp;
    let updated = UserProfile {
        xp: new_xp_total,
        level: reward::level_for_xp(new_xp_total),
        coins: profile.coins + coins,
        weekly_coins: profile.weekly_coins + coins,
        xp_earned_today: cap.xp_earned_today,
        last_xp_award_at: Some(cap.last_xp_award_at),
        updated_at: now,
        ..profile
    };

    // 7. Ledger.
    let entry = CompletedEvent {
        id: Uuid::new_v4(),
        owner_id: caller_id,
        event_id: event.id,
        completed_at: now,
        completion_fraction: fraction,
        reward_xp: cap.granted_xp,
        reward_coins: coins,
        completed_length_seconds: (event.length_seconds as f64 * fraction).round() as i64,
        title: event.title.clone(),
        category: event.category,
        energy: event.energy,
    };
    tx.insert_completed_event(&entry).await?;

    // 8. Profile.
    tx.update_profile(&updated).await?;

    // 9. Retire or advance the event.
    let event_retired = fraction >= 1.0;
    if event_retired {
        tx.delete_event(event.id).await?;
    } else {
        tx.record_partial_settlement(event.id, fraction).await?;
    }

    tx.commit().await?;

    Ok(SettlementOutcome {
        ledger_id: entry.id,
        granted_xp: cap.granted_xp,
        coins,
        new_xp_total: updated.xp,
        new_level: updated.level,
        new_coins: updated.coins,
        new_weekly_coins: updated.weekly_coins,
        event_retired,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Category;
    use crate::store::MemoryRewardStore;
    use crate::types::Timestamp;

    fn noon() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 4, 2, 12, 0, 0).unwrap()
    }

    fn event_for(owner_id: RecordId) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id,
            task_id: None,
            title: "Read a chapter".into(),
            description: String::new(),
            scheduled_at: noon(),
            length_seconds: 1800,
            category: Category::Learning,
            energy: 2,
            base_xp: 10,
            base_coins: 2,
            settled_fraction: None,
            created_at: noon(),
        }
    }

    struct Fixture {
        store: MemoryRewardStore,
        clock: ManualClock,
        user: RecordId,
        event: Event,
    }

    async fn fixture() -> Fixture {
        let store = MemoryRewardStore::new();
        let user = Uuid::new_v4();
        store
            .insert_profile(&UserProfile::new(user, "ada", noon()))
            .await
            .unwrap();
        let event = event_for(user);
        store.insert_event(&event).await.unwrap();
        Fixture {
            store,
            clock: ManualClock::new(noon()),
            user,
            event,
        }
    }

    impl Fixture {
        async fn settle(&self, caller: RecordId, fraction: f64) -> Result<SettlementOutcome, CoreError> {
            settle(
                &self.store,
                &self.clock,
                caller,
                SettlementRequest {
                    event_id: self.event.id,
                    completion_fraction: fraction,
                },
            )
            .await
        }

        async fn profile(&self) -> UserProfile {
            self.store.get_profile(self.user).await.unwrap().unwrap()
        }

        async fn ledger_len(&self) -> usize {
            self.store
                .list_completed_by_owner(self.user, 100)
                .await
                .unwrap()
                .len()
        }
    }

    #[tokio::test]
    async fn full_completion_rewards_and_retires_event() {
        let f = fixture().await;
        let outcome = f.settle(f.user, 1.0).await.unwrap();

        assert_eq!(outcome.granted_xp, 20);
        assert_eq!(outcome.coins, 4);
        assert_eq!(outcome.new_xp_total, 20);
        assert_eq!(outcome.new_level, 1);
        assert_eq!(outcome.new_coins, 4);
        assert_eq!(outcome.new_weekly_coins, 4);
        assert!(outcome.event_retired);

        let profile = f.profile().await;
        assert_eq!(profile.xp, 20);
        assert_eq!(profile.coins, 4);
        assert_eq!(profile.xp_earned_today, 20);
        assert_eq!(profile.last_xp_award_at, Some(noon()));
        assert!(f.store.get_event(f.event.id).await.unwrap().is_none());

        let ledger = f.store.list_completed_by_owner(f.user, 10).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].id, outcome.ledger_id);
        assert_eq!(ledger[0].completed_length_seconds, 1800);
        assert_eq!(ledger[0].title, "Read a chapter");
    }

    #[tokio::test]
    async fn half_completion_keeps_event() {
        let f = fixture().await;
        let outcome = f.settle(f.user, 0.5).await.unwrap();

        assert_eq!(outcome.granted_xp, 10);
        assert_eq!(outcome.coins, 2);
        assert!(!outcome.event_retired);

        let event = f.store.get_event(f.event.id).await.unwrap().unwrap();
        assert_eq!(event.settled_fraction, Some(0.5));
        let ledger = f.store.list_completed_by_owner(f.user, 10).await.unwrap();
        assert_eq!(ledger[0].completed_length_seconds, 900);
    }

    #[tokio::test]
    async fn daily_cap_trims_granted_xp() {
        let f = fixture().await;
        let mut tx = f.store.begin_settlement().await.unwrap();
        let mut profile = tx.lock_profile(f.user).await.unwrap().unwrap();
        profile.xp_earned_today = 195;
        profile.last_xp_award_at = Some(noon() - Duration::hours(1));
        tx.update_profile(&profile).await.unwrap();
        tx.commit().await.unwrap();

        let outcome = f.settle(f.user, 1.0).await.unwrap();
        assert_eq!(outcome.granted_xp, 5);
        assert_eq!(outcome.coins, 4, "coins are never capped");
        assert_eq!(f.profile().await.xp_earned_today, 200);
    }

    #[tokio::test]
    async fn foreign_caller_is_forbidden_without_mutation() {
        let f = fixture().await;
        let before = f.profile().await;

        let err = f.settle(Uuid::new_v4(), 1.0).await.unwrap_err();
        assert_matches!(err, CoreError::Forbidden(_));

        assert_eq!(f.profile().await, before);
        assert_eq!(f.ledger_len().await, 0);
        assert!(f.store.get_event(f.event.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_full_settlement_is_not_found() {
        let f = fixture().await;
        f.settle(f.user, 1.0).await.unwrap();
        let after_first = f.profile().await;

        let err = f.settle(f.user, 1.0).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Event", .. });
        assert_eq!(f.profile().await, after_first);
        assert_eq!(f.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_settlements_apply_once() {
        let f = fixture().await;
        let (a, b) = tokio::join!(f.settle(f.user, 1.0), f.settle(f.user, 1.0));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(f.profile().await.xp, 20);
        assert_eq!(f.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn partial_then_full_pays_only_the_difference() {
        let f = fixture().await;
        f.settle(f.user, 0.5).await.unwrap();
        let outcome = f.settle(f.user, 1.0).await.unwrap();

        assert_eq!(outcome.granted_xp, 10);
        assert_eq!(outcome.coins, 2);
        assert!(outcome.event_retired);
        let profile = f.profile().await;
        assert_eq!(profile.xp, 20);
        assert_eq!(profile.coins, 4);
    }

    #[tokio::test]
    async fn non_advancing_partial_settlement_conflicts() {
        let f = fixture().await;
        f.settle(f.user, 0.5).await.unwrap();

        let err = f.settle(f.user, 0.4).await.unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(f.ledger_len().await, 1);
    }

    #[tokio::test]
    async fn repeating_the_settled_fraction_conflicts() {
        let f = fixture().await;
        f.settle(f.user, 0.5).await.unwrap();
        let before = f.profile().await;

        let err = f.settle(f.user, 0.5).await.unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(f.ledger_len().await, 1);
        assert_eq!(f.profile().await, before);
        let event = f.store.get_event(f.event.id).await.unwrap().unwrap();
        assert_eq!(event.settled_fraction, Some(0.5));
    }

    #[tokio::test]
    async fn out_of_range_fraction_is_invalid_input() {
        let f = fixture().await;
        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            assert_matches!(f.settle(f.user, bad).await, Err(CoreError::InvalidInput(_)));
        }
        assert_eq!(f.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn missing_profile_is_not_found() {
        let store = MemoryRewardStore::new();
        let user = Uuid::new_v4();
        let event = event_for(user);
        store.insert_event(&event).await.unwrap();

        let err = settle(
            &store,
            &ManualClock::new(noon()),
            user,
            SettlementRequest {
                event_id: event.id,
                completion_fraction: 1.0,
            },
        )
        .await
        .unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "UserProfile", .. });
        assert!(store.get_event(event.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let f = fixture().await;
        f.store.fail_commits(true);

        assert_matches!(f.settle(f.user, 1.0).await, Err(CoreError::Internal(_)));
        f.store.fail_commits(false);

        assert_eq!(f.profile().await.xp, 0);
        assert_eq!(f.ledger_len().await, 0);
        assert!(f.store.get_event(f.event.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn award_on_next_utc_day_resets_counter() {
        let f = fixture().await;
        f.settle(f.user, 0.5).await.unwrap();

        f.clock.advance(Duration::days(1));
        f.settle(f.user, 1.0).await.unwrap();
        assert_eq!(f.profile().await.xp_earned_today, 10);
    }
}
