//! Client-side countdown for one attempt at completing an event.
//!
//! ```text
//! not_started --start--> running --pause--> paused --resume--> running
//!                        running --expiry / end_early--> completed
//!                        paused  --end_early-----------> completed
//! ```
//!
//! Remaining time is always derived from absolute instants (planned end,
//! pause start, accumulated pause), never from a decrementing counter, so a
//! session restored from its [`store`] after a reload or suspension is still
//! correct. Completion hands out a [`CompletionRequest`] exactly once; the
//! caller then reports whether settlement succeeded. A failed settlement
//! puts the session back into `paused` so the user can retry or abandon.

pub mod store;

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::reward::clamp_fraction;
use crate::types::{RecordId, Timestamp};

pub use store::{FileSessionStore, MemorySessionStore, SessionStore, SessionStoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::NotStarted => "not_started",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {action} a session that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    #[error("No settlement is pending for this session")]
    NothingPending,
}

/// The single message a completed session sends to settlement.
///
/// Serializes to the wire shape `{ "eventId", "completionPercentage" }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(rename = "eventId")]
    pub event_id: RecordId,
    #[serde(rename = "completionPercentage")]
    pub completion_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    event_id: RecordId,
    planned_duration_secs: i64,
    state: SessionState,
    started_at: Option<Timestamp>,
    planned_end_at: Option<Timestamp>,
    paused_at: Option<Timestamp>,
    accumulated_pause_ms: i64,
    completed_at: Option<Timestamp>,
    pending: Option<CompletionRequest>,
}

impl Session {
    pub fn new(event_id: RecordId, planned_duration_secs: i64) -> Self {
        Self {
            event_id,
            planned_duration_secs: planned_duration_secs.max(0),
            state: SessionState::NotStarted,
            started_at: None,
            planned_end_at: None,
            paused_at: None,
            accumulated_pause_ms: 0,
            completed_at: None,
            pending: None,
        }
    }

    pub fn event_id(&self) -> RecordId {
        self.event_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn planned_duration(&self) -> Duration {
        Duration::seconds(self.planned_duration_secs)
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    /// Total time spent paused so far (excluding an open pause).
    pub fn accumulated_pause(&self) -> Duration {
        Duration::milliseconds(self.accumulated_pause_ms)
    }

    /// Whether this session belongs in the local store.
    pub fn is_persistable(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Paused)
    }

    /// Completion request awaiting a settlement outcome, if any.
    pub fn pending_settlement(&self) -> Option<CompletionRequest> {
        self.pending
    }

    // -- transitions ---------------------------------------------------------

    pub fn start(&mut self, now: Timestamp) -> Result<(), SessionError> {
        self.require("start", &[SessionState::NotStarted])?;
        self.started_at = Some(now);
        self.planned_end_at = Some(now + self.planned_duration());
        self.paused_at = None;
        self.accumulated_pause_ms = 0;
        self.state = SessionState::Running;
        Ok(())
    }

    pub fn pause(&mut self, now: Timestamp) -> Result<(), SessionError> {
        self.require("pause", &[SessionState::Running])?;
        self.paused_at = Some(now);
        self.state = SessionState::Paused;
        Ok(())
    }

    pub fn resume(&mut self, now: Timestamp) -> Result<(), SessionError> {
        self.require("resume", &[SessionState::Paused])?;
        self.close_open_pause(now);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Scheduling tick. Returns the completion request the first time a
    /// running session reaches zero; every other call is a no-op.
    pub fn tick(&mut self, now: Timestamp) -> Option<CompletionRequest> {
        if self.state != SessionState::Running || self.remaining(now) > Duration::zero() {
            return None;
        }
        Some(self.complete(now, 1.0))
    }

    /// Stop before the timer runs out, settling for the share already worked.
    pub fn end_early(&mut self, now: Timestamp) -> Result<CompletionRequest, SessionError> {
        self.require("end", &[SessionState::Running, SessionState::Paused])?;
        self.close_open_pause(now);
        let fraction = self.fraction_done(self.remaining(now));
        Ok(self.complete(now, fraction))
    }

    /// Check the session may be discarded without settling.
    ///
    /// On success the caller drops the session and its persisted record.
    pub fn abandon(&self) -> Result<(), SessionError> {
        self.require("abandon", &[SessionState::NotStarted, SessionState::Paused])
    }

    /// Settlement accepted the pending request. The session stays completed.
    pub fn settlement_succeeded(&mut self) -> Result<CompletionRequest, SessionError> {
        self.take_pending()
    }

    /// Settlement failed: reopen as `paused` with remaining time frozen at
    /// the moment of completion.
    pub fn settlement_failed(&mut self) -> Result<CompletionRequest, SessionError> {
        let request = self.take_pending()?;
        self.paused_at = self.completed_at.take();
        self.state = SessionState::Paused;
        Ok(request)
    }

    // -- time ----------------------------------------------------------------

    /// Time left at `now`, never negative. Frozen while paused or completed.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        let reference = match self.state {
            SessionState::NotStarted => return self.planned_duration(),
            SessionState::Running => now,
            SessionState::Paused => self.paused_at.unwrap_or(now),
            SessionState::Completed => self.completed_at.unwrap_or(now),
        };
        let Some(end) = self.planned_end_at else {
            return self.planned_duration();
        };
        (end - reference + self.accumulated_pause()).max(Duration::zero())
    }

    /// Share of the planned duration worked by `now`.
    pub fn completion_fraction(&self, now: Timestamp) -> f64 {
        self.fraction_done(self.remaining(now))
    }

    // -- internals -----------------------------------------------------------

    fn fraction_done(&self, remaining: Duration) -> f64 {
        let planned_ms = self.planned_duration().num_milliseconds();
        if planned_ms <= 0 {
            return 1.0;
        }
        clamp_fraction(1.0 - remaining.num_milliseconds() as f64 / planned_ms as f64)
    }

    fn complete(&mut self, now: Timestamp, fraction: f64) -> CompletionRequest {
        let request = CompletionRequest {
            event_id: self.event_id,
            completion_fraction: fraction,
        };
        self.completed_at = Some(now);
        self.pending = Some(request);
        self.state = SessionState::Completed;
        request
    }

    fn close_open_pause(&mut self, now: Timestamp) {
        if let Some(paused_at) = self.paused_at.take() {
            let paused_for = (now - paused_at).max(Duration::zero());
            self.accumulated_pause_ms += paused_for.num_milliseconds();
        }
    }

    fn take_pending(&mut self) -> Result<CompletionRequest, SessionError> {
        if self.state != SessionState::Completed {
            return Err(SessionError::NothingPending);
        }
        self.pending.take().ok_or(SessionError::NothingPending)
    }

    fn require(&self, action: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 5, 5, 8, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn running(duration: i64) -> Session {
        let mut session = Session::new(Uuid::new_v4(), duration);
        session.start(t0()).unwrap();
        session
    }

    #[test]
    fn start_only_from_not_started() {
        let mut session = running(60);
        assert_matches!(
            session.start(t0()),
            Err(SessionError::InvalidTransition { action: "start", state: SessionState::Running })
        );
    }

    #[test]
    fn remaining_counts_down_from_planned_end() {
        let session = running(600);
        assert_eq!(session.remaining(t0()), secs(600));
        assert_eq!(session.remaining(t0() + secs(250)), secs(350));
        assert_eq!(session.remaining(t0() + secs(9999)), Duration::zero());
    }

    #[test]
    fn pause_freezes_and_resume_excludes_paused_time() {
        let mut session = running(600);
        session.pause(t0() + secs(100)).unwrap();
        assert_eq!(session.remaining(t0() + secs(400)), secs(500));

        session.resume(t0() + secs(400)).unwrap();
        assert_eq!(session.remaining(t0() + secs(400)), secs(500));
        assert_eq!(session.accumulated_pause(), secs(300));
        assert_eq!(session.remaining(t0() + secs(450)), secs(450));
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let mut session = Session::new(Uuid::new_v4(), 60);
        assert!(session.pause(t0()).is_err());
        assert!(session.resume(t0()).is_err());
        session.start(t0()).unwrap();
        assert!(session.resume(t0()).is_err());
    }

    #[test]
    fn expiry_fires_exactly_once() {
        let mut session = running(60);
        assert_eq!(session.tick(t0() + secs(59)), None);

        let request = session.tick(t0() + secs(60)).expect("expiry should fire");
        assert_eq!(request.completion_fraction, 1.0);
        assert_eq!(session.state(), SessionState::Completed);

        assert_eq!(session.tick(t0() + secs(61)), None);
        assert_eq!(session.tick(t0() + secs(120)), None);
    }

    #[test]
    fn paused_session_never_expires() {
        let mut session = running(60);
        session.pause(t0() + secs(10)).unwrap();
        assert_eq!(session.tick(t0() + secs(3600)), None);
        assert_eq!(session.state(), SessionState::Paused);
    }

    #[test]
    fn expiry_accounts_for_pauses() {
        let mut session = running(60);
        session.pause(t0() + secs(30)).unwrap();
        session.resume(t0() + secs(90)).unwrap();
        assert_eq!(session.tick(t0() + secs(100)), None);
        assert!(session.tick(t0() + secs(120)).is_some());
    }

    #[test]
    fn end_early_reports_share_worked() {
        let mut session = running(1000);
        let request = session.end_early(t0() + secs(250)).unwrap();
        assert!((request.completion_fraction - 0.25).abs() < 1e-9);
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[test]
    fn end_early_while_paused_uses_frozen_time() {
        let mut session = running(1000);
        session.pause(t0() + secs(500)).unwrap();
        let request = session.end_early(t0() + secs(900)).unwrap();
        assert!((request.completion_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn end_early_requires_started_session() {
        let mut session = Session::new(Uuid::new_v4(), 60);
        assert!(session.end_early(t0()).is_err());
    }

    #[test]
    fn zero_length_session_completes_fully() {
        let mut session = running(0);
        let request = session.tick(t0()).expect("zero-length session expires at once");
        assert_eq!(request.completion_fraction, 1.0);
    }

    #[test]
    fn abandon_allowed_only_before_start_or_while_paused() {
        let mut session = Session::new(Uuid::new_v4(), 60);
        assert!(session.abandon().is_ok());
        session.start(t0()).unwrap();
        assert!(session.abandon().is_err());
        session.pause(t0() + secs(5)).unwrap();
        assert!(session.abandon().is_ok());
    }

    #[test]
    fn failed_settlement_reopens_paused_with_frozen_time() {
        let mut session = running(1000);
        let request = session.end_early(t0() + secs(400)).unwrap();

        assert_eq!(session.settlement_failed().unwrap(), request);
        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(session.remaining(t0() + secs(5000)), secs(600));
        assert_eq!(session.pending_settlement(), None);

        let retry = session.end_early(t0() + secs(5000)).unwrap();
        assert!((retry.completion_fraction - 0.4).abs() < 1e-9);
    }

    #[test]
    fn failed_expiry_can_be_retried_at_full_completion() {
        let mut session = running(60);
        session.tick(t0() + secs(65)).unwrap();
        session.settlement_failed().unwrap();

        let retry = session.end_early(t0() + secs(200)).unwrap();
        assert_eq!(retry.completion_fraction, 1.0);
    }

    #[test]
    fn succeeded_settlement_clears_pending() {
        let mut session = running(60);
        session.tick(t0() + secs(60)).unwrap();
        assert!(session.pending_settlement().is_some());
        session.settlement_succeeded().unwrap();
        assert_eq!(session.pending_settlement(), None);
        assert_eq!(session.settlement_succeeded(), Err(SessionError::NothingPending));
    }

    #[test]
    fn only_active_sessions_are_persistable() {
        let mut session = Session::new(Uuid::new_v4(), 60);
        assert!(!session.is_persistable());
        session.start(t0()).unwrap();
        assert!(session.is_persistable());
        session.end_early(t0() + secs(1)).unwrap();
        assert!(!session.is_persistable());
    }

    #[test]
    fn completion_request_uses_wire_field_names() {
        let request = CompletionRequest {
            event_id: Uuid::nil(),
            completion_fraction: 0.5,
        };
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json["completionPercentage"], 0.5);
        assert!(json["eventId"].is_string());
    }
}
