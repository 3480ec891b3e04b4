//! Drives one session against a settlement gateway.
//!
//! The runner owns the [`Session`], persists it after every transition and
//! is the only caller of the gateway, so a finished session is settled
//! through exactly one path. When a call fails without an answer from the
//! server the outcome is unknown for the rest of the session. A later retry
//! that finds the event gone, or its progress already recorded, means an
//! earlier attempt went through and the session is treated as settled.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use habitquest_core::clock::Clock;
use habitquest_core::error::ErrorKind;
use habitquest_core::session::{
    CompletionRequest, Session, SessionError, SessionState, SessionStore, SessionStoreError,
};
use habitquest_core::types::RecordId;
use tokio::sync::mpsc;

use crate::api::{ClientError, CompletionReceipt, SettlementGateway};

/// Scheduling tick for the countdown.
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] SessionStoreError),

    #[error("Session has already been settled or abandoned")]
    Finished,
}

/// Result of handing a completion request to the gateway.
#[derive(Debug)]
pub enum SettleOutcome {
    Settled(CompletionReceipt),
    /// A retry after an unanswered call found the event gone or its
    /// progress already recorded.
    LikelyAlreadySettled,
    /// Settlement failed; the session is paused and can be retried or abandoned.
    Failed(ClientError),
}

impl SettleOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, SettleOutcome::Failed(_))
    }
}

/// User intents fed into [`SessionRunner::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    EndEarly,
    Abandon,
}

/// Progress reported by [`SessionRunner::run`].
#[derive(Debug)]
pub enum Update {
    Remaining {
        state: SessionState,
        remaining: Duration,
    },
    Settlement(SettleOutcome),
    Rejected(RunnerError),
    Abandoned,
}

pub struct SessionRunner<G, S> {
    session: Session,
    gateway: G,
    store: S,
    clock: Arc<dyn Clock>,
    outcome_unknown: bool,
    finished: bool,
}

impl<G, S> SessionRunner<G, S>
where
    G: SettlementGateway,
    S: SessionStore,
{
    /// Resume the persisted session for `event_id`, or prepare a fresh one.
    ///
    /// A persisted session for a different event is discarded.
    pub fn open(
        event_id: RecordId,
        planned_duration_secs: i64,
        gateway: G,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RunnerError> {
        let session = match store.load()? {
            Some(saved) if saved.event_id() == event_id => {
                tracing::info!(%event_id, state = %saved.state(), "Restored persisted session");
                saved
            }
            Some(stale) => {
                tracing::warn!(
                    stale_event_id = %stale.event_id(),
                    %event_id,
                    "Discarding persisted session for another event"
                );
                store.clear()?;
                Session::new(event_id, planned_duration_secs)
            }
            None => Session::new(event_id, planned_duration_secs),
        };

        Ok(Self {
            session,
            gateway,
            store,
            clock,
            outcome_unknown: false,
            finished: false,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn remaining(&self) -> Duration {
        self.session.remaining(self.clock.now())
    }

    pub fn start(&mut self) -> Result<(), RunnerError> {
        self.ensure_open()?;
        self.session.start(self.clock.now())?;
        self.persist()
    }

    pub fn pause(&mut self) -> Result<(), RunnerError> {
        self.ensure_open()?;
        self.session.pause(self.clock.now())?;
        self.persist()
    }

    pub fn resume(&mut self) -> Result<(), RunnerError> {
        self.ensure_open()?;
        self.session.resume(self.clock.now())?;
        self.persist()
    }

    /// Discard the session without settling. Only allowed before start or while paused.
    pub fn abandon(&mut self) -> Result<(), RunnerError> {
        self.ensure_open()?;
        self.session.abandon()?;
        self.store.clear()?;
        self.finished = true;
        tracing::info!(event_id = %self.session.event_id(), "Session abandoned");
        Ok(())
    }

    pub async fn end_early(&mut self) -> Result<SettleOutcome, RunnerError> {
        self.ensure_open()?;
        let request = self.session.end_early(self.clock.now())?;
        self.persist()?;
        self.settle(request).await
    }

    /// Advance the countdown; settles once when a running session reaches zero.
    pub async fn tick(&mut self) -> Result<Option<SettleOutcome>, RunnerError> {
        if self.finished {
            return Ok(None);
        }
        match self.session.tick(self.clock.now()) {
            Some(request) => {
                self.persist()?;
                Ok(Some(self.settle(request).await?))
            }
            None => Ok(None),
        }
    }

    async fn settle(&mut self, request: CompletionRequest) -> Result<SettleOutcome, RunnerError> {
        let outcome = match self.gateway.complete_event(request).await {
            Ok(receipt) => {
                self.session.settlement_succeeded()?;
                tracing::info!(
                    event_id = %request.event_id,
                    xp = receipt.rewards.xp,
                    coins = receipt.rewards.coins,
                    level = receipt.user.level,
                    "Session settled"
                );
                SettleOutcome::Settled(receipt)
            }
            Err(err) if self.outcome_unknown && already_applied(&err) => {
                self.session.settlement_succeeded()?;
                tracing::warn!(
                    event_id = %request.event_id,
                    error = %err,
                    "Settlement already applied by an unanswered attempt; treating as settled"
                );
                SettleOutcome::LikelyAlreadySettled
            }
            Err(err) => {
                self.outcome_unknown |= err.outcome_unknown();
                self.session.settlement_failed()?;
                tracing::error!(
                    event_id = %request.event_id,
                    error = %err,
                    outcome_unknown = self.outcome_unknown,
                    "Settlement failed; session paused"
                );
                SettleOutcome::Failed(err)
            }
        };

        if outcome.is_final() {
            self.finished = true;
        }
        self.persist()?;
        Ok(outcome)
    }

    fn persist(&self) -> Result<(), RunnerError> {
        self.store.sync(&self.session)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RunnerError> {
        if self.finished {
            Err(RunnerError::Finished)
        } else {
            Ok(())
        }
    }

    async fn handle(&mut self, command: Command) -> Result<Option<Update>, RunnerError> {
        match command {
            Command::Start => self.start()?,
            Command::Pause => self.pause()?,
            Command::Resume => self.resume()?,
            Command::EndEarly => return Ok(Some(Update::Settlement(self.end_early().await?))),
            Command::Abandon => {
                self.abandon()?;
                return Ok(Some(Update::Abandoned));
            }
        }
        Ok(None)
    }

    fn remaining_update(&self) -> Update {
        Update::Remaining {
            state: self.session.state(),
            remaining: self.remaining(),
        }
    }

    /// Tick once per second and apply commands until the session is settled
    /// or abandoned, or the command channel closes.
    ///
    /// Closing the channel leaves an active session persisted for later.
    /// Invalid commands are reported as [`Update::Rejected`]; store failures
    /// end the loop with an error.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        updates: mpsc::Sender<Update>,
    ) -> Result<(), RunnerError> {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.finished {
            let update = tokio::select! {
                _ = ticker.tick() => match self.tick().await? {
                    Some(outcome) => Update::Settlement(outcome),
                    None => self.remaining_update(),
                },
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::info!(state = %self.session.state(), "Command channel closed");
                        break;
                    };
                    match self.handle(command).await {
                        Ok(Some(update)) => update,
                        Ok(None) => self.remaining_update(),
                        Err(RunnerError::Store(err)) => return Err(err.into()),
                        Err(err) => Update::Rejected(err),
                    }
                }
            };
            // A dropped receiver only means nobody is watching.
            let _ = updates.send(update).await;
        }
        Ok(())
    }
}

/// Rejections that an earlier, applied attempt would cause: a full
/// settlement deletes the event, a partial one records its fraction.
fn already_applied(err: &ClientError) -> bool {
    matches!(err.kind(), Some(ErrorKind::NotFound | ErrorKind::Conflict))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use habitquest_core::clock::ManualClock;
    use habitquest_core::session::MemorySessionStore;
    use uuid::Uuid;

    use super::*;
    use crate::api::{ProfileTotals, RewardGrant};

    #[derive(Default)]
    struct FakeGateway {
        replies: Mutex<VecDeque<Result<CompletionReceipt, ClientError>>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeGateway {
        fn replying(replies: Vec<Result<CompletionReceipt, ClientError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SettlementGateway for FakeGateway {
        async fn complete_event(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionReceipt, ClientError> {
            self.calls.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected settlement call")
        }
    }

    fn receipt(xp: i64) -> CompletionReceipt {
        CompletionReceipt {
            ok: true,
            completed_event_id: Uuid::new_v4(),
            rewards: RewardGrant { xp, coins: 2 },
            user: ProfileTotals {
                xp,
                level: 1,
                coins: 2,
                weekly_coins: 2,
            },
        }
    }

    fn api_error(kind: ErrorKind, status: u16) -> ClientError {
        ClientError::Api {
            status,
            kind,
            message: "rejected".into(),
        }
    }

    /// A real transport error: nothing listens on port 1.
    async fn transport_error() -> ClientError {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err()
            .into()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 2, 8, 0, 0).unwrap(),
        ))
    }

    fn runner(
        gateway: FakeGateway,
        clock: &Arc<ManualClock>,
    ) -> SessionRunner<FakeGateway, MemorySessionStore> {
        SessionRunner::open(
            Uuid::new_v4(),
            600,
            gateway,
            MemorySessionStore::new(),
            clock.clone(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn expiry_settles_once_and_clears_the_record() {
        let clock = clock();
        let mut runner = runner(FakeGateway::replying(vec![Ok(receipt(20))]), &clock);
        runner.start().unwrap();
        assert!(runner.store().load().unwrap().is_some());

        clock.advance(Duration::seconds(599));
        assert!(runner.tick().await.unwrap().is_none());

        clock.advance(Duration::seconds(1));
        let outcome = runner.tick().await.unwrap();
        assert_matches!(outcome, Some(SettleOutcome::Settled(r)) if r.rewards.xp == 20);
        assert!(runner.is_finished());
        assert!(runner.store().load().unwrap().is_none());

        clock.advance(Duration::seconds(5));
        assert!(runner.tick().await.unwrap().is_none());
        let calls = runner.gateway().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].completion_fraction, 1.0);
    }

    #[tokio::test]
    async fn pause_and_resume_persist_each_transition() {
        let clock = clock();
        let mut runner = runner(FakeGateway::default(), &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(100));
        runner.pause().unwrap();

        let saved = runner.store().load().unwrap().unwrap();
        assert_eq!(saved.state(), SessionState::Paused);

        clock.advance(Duration::seconds(300));
        assert_eq!(runner.remaining(), Duration::seconds(500));
        runner.resume().unwrap();
        assert_eq!(
            runner.store().load().unwrap().unwrap().state(),
            SessionState::Running
        );
        assert_eq!(runner.remaining(), Duration::seconds(500));
    }

    #[tokio::test]
    async fn end_early_sends_worked_fraction() {
        let clock = clock();
        let mut runner = runner(FakeGateway::replying(vec![Ok(receipt(10))]), &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(300));

        let outcome = runner.end_early().await.unwrap();
        assert_matches!(outcome, SettleOutcome::Settled(_));
        let calls = runner.gateway().calls();
        assert!((calls[0].completion_fraction - 0.5).abs() < 1e-9);
        assert_matches!(runner.pause(), Err(RunnerError::Finished));
    }

    #[tokio::test]
    async fn failed_settlement_pauses_and_persists_for_retry() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![
            Err(api_error(ErrorKind::InternalFault, 500)),
            Ok(receipt(10)),
        ]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(300));

        let outcome = runner.end_early().await.unwrap();
        assert_matches!(outcome, SettleOutcome::Failed(_));
        assert!(!runner.is_finished());
        assert_eq!(runner.session().state(), SessionState::Paused);
        assert_eq!(
            runner.store().load().unwrap().unwrap().state(),
            SessionState::Paused
        );

        // Time frozen at the failed completion.
        clock.advance(Duration::seconds(120));
        assert_eq!(runner.remaining(), Duration::seconds(300));

        let retry = runner.end_early().await.unwrap();
        assert_matches!(retry, SettleOutcome::Settled(_));
        let calls = runner.gateway().calls();
        assert_eq!(calls.len(), 2);
        assert!((calls[1].completion_fraction - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_session_can_be_abandoned() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![Err(api_error(ErrorKind::Forbidden, 403))]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        runner.end_early().await.unwrap();

        runner.abandon().unwrap();
        assert!(runner.is_finished());
        assert!(runner.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn running_session_cannot_be_abandoned() {
        let clock = clock();
        let mut runner = runner(FakeGateway::default(), &clock);
        runner.start().unwrap();
        assert_matches!(
            runner.abandon(),
            Err(RunnerError::Session(SessionError::InvalidTransition { .. }))
        );
        assert!(runner.store().load().unwrap().is_some());
    }

    #[tokio::test]
    async fn not_found_after_unanswered_attempt_counts_as_settled() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![
            Err(transport_error().await),
            Err(api_error(ErrorKind::NotFound, 404)),
        ]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(600));

        assert_matches!(
            runner.tick().await.unwrap(),
            Some(SettleOutcome::Failed(ClientError::Request(_)))
        );
        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::LikelyAlreadySettled
        );
        assert!(runner.is_finished());
        assert!(runner.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn conflict_after_unanswered_partial_attempt_counts_as_settled() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![
            Err(transport_error().await),
            Err(api_error(ErrorKind::Conflict, 409)),
        ]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(300));

        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::Failed(ClientError::Request(_))
        );
        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::LikelyAlreadySettled
        );
        assert!(runner.is_finished());
        assert!(runner.store().load().unwrap().is_none());

        let calls = runner.gateway().calls();
        assert_eq!(calls.len(), 2);
        assert!((calls[1].completion_fraction - calls[0].completion_fraction).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_outcome_survives_an_answered_failure() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![
            Err(transport_error().await),
            Err(api_error(ErrorKind::InternalFault, 500)),
            Err(api_error(ErrorKind::NotFound, 404)),
        ]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(600));

        assert_matches!(
            runner.tick().await.unwrap(),
            Some(SettleOutcome::Failed(ClientError::Request(_)))
        );
        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::Failed(ClientError::Api { status: 500, .. })
        );
        assert!(!runner.is_finished());
        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::LikelyAlreadySettled
        );
        assert!(runner.is_finished());
    }

    #[tokio::test]
    async fn conflict_on_first_attempt_is_a_failure() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![Err(api_error(ErrorKind::Conflict, 409))]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(300));

        assert_matches!(
            runner.end_early().await.unwrap(),
            SettleOutcome::Failed(ClientError::Api { status: 409, .. })
        );
        assert_eq!(runner.session().state(), SessionState::Paused);
    }

    #[tokio::test]
    async fn not_found_on_first_attempt_is_a_failure() {
        let clock = clock();
        let gateway = FakeGateway::replying(vec![Err(api_error(ErrorKind::NotFound, 404))]);
        let mut runner = runner(gateway, &clock);
        runner.start().unwrap();
        clock.advance(Duration::seconds(600));

        assert_matches!(
            runner.tick().await.unwrap(),
            Some(SettleOutcome::Failed(_))
        );
        assert_eq!(runner.session().state(), SessionState::Paused);
    }

    #[tokio::test]
    async fn open_restores_matching_session_and_drops_others() {
        let clock = clock();
        let store = MemorySessionStore::new();
        let event_id = Uuid::new_v4();
        let mut saved = Session::new(event_id, 600);
        saved.start(clock.now()).unwrap();
        store.save(&saved).unwrap();

        clock.advance(Duration::seconds(60));
        let runner = SessionRunner::open(
            event_id,
            600,
            FakeGateway::default(),
            store,
            clock.clone(),
        )
        .unwrap();
        assert_eq!(runner.session().state(), SessionState::Running);
        assert_eq!(runner.remaining(), Duration::seconds(540));

        let other = SessionRunner::open(
            Uuid::new_v4(),
            300,
            FakeGateway::default(),
            MemorySessionStore::new(),
            clock.clone(),
        )
        .unwrap();
        assert_eq!(other.session().state(), SessionState::NotStarted);

        let store = MemorySessionStore::new();
        store.save(&saved).unwrap();
        let replaced = SessionRunner::open(
            Uuid::new_v4(),
            300,
            FakeGateway::default(),
            store,
            clock.clone(),
        )
        .unwrap();
        assert_eq!(replaced.session().state(), SessionState::NotStarted);
        assert!(replaced.store().load().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_settles_on_end_early_command() {
        let clock = clock();
        let runner = runner(FakeGateway::replying(vec![Ok(receipt(10))]), &clock);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (update_tx, mut update_rx) = mpsc::channel(64);
        let handle = tokio::spawn(runner.run(command_rx, update_tx));

        command_tx.send(Command::Start).await.unwrap();
        command_tx.send(Command::Resume).await.unwrap();
        clock.advance(Duration::seconds(150));
        command_tx.send(Command::EndEarly).await.unwrap();

        let mut saw_rejection = false;
        let mut settled = false;
        while let Some(update) = update_rx.recv().await {
            match update {
                Update::Rejected(RunnerError::Session(_)) => saw_rejection = true,
                Update::Settlement(SettleOutcome::Settled(_)) => settled = true,
                _ => {}
            }
        }
        handle.await.unwrap().unwrap();
        assert!(saw_rejection, "resume while running should be rejected");
        assert!(settled);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_exits_when_commands_close() {
        let clock = clock();
        let runner = runner(FakeGateway::default(), &clock);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (update_tx, _update_rx) = mpsc::channel(64);
        let handle = tokio::spawn(runner.run(command_rx, update_tx));

        command_tx.send(Command::Start).await.unwrap();
        drop(command_tx);
        handle.await.unwrap().unwrap();
    }
}
