//! Submission controller: binds the roster to a contest, once per round.
//!
//! Owns the session: the roster, the `is_submitted` flag and the
//! in-flight marker. Validation happens locally before the gateway is
//! called; `Submitted` is only ever set after the gateway returns a
//! verified record. Changes are published on a `watch` channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::roster::{RosterManager, ToggleOutcome};
use crate::storage::{PersistenceError, PersistenceGateway};
use crate::types::{Asset, Contest, ContestState, Prediction, Selection, Submission, MAX_ROSTER_SIZE};

// ---------------------------------------------------------------------------
// Phase, policy & errors
// ---------------------------------------------------------------------------

/// Where the session is in the build → submit → reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionPhase {
    /// No selections.
    Empty,
    /// Some selections, room left.
    Building,
    /// Full roster, not submitted. The only phase that offers submit.
    ReadyToSubmit,
    /// A gateway call is pending.
    Submitting,
    /// A submission exists and has not been reset.
    Submitted,
}

impl SubmissionPhase {
    /// `ReadyToSubmit` is the full-roster subset of building.
    pub fn is_building(&self) -> bool {
        matches!(self, SubmissionPhase::Building | SubmissionPhase::ReadyToSubmit)
    }

    /// Roster edits are refused in these phases.
    pub fn is_locked(&self) -> bool {
        matches!(self, SubmissionPhase::Submitting | SubmissionPhase::Submitted)
    }
}

impl fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionPhase::Empty => write!(f, "Empty"),
            SubmissionPhase::Building => write!(f, "Building"),
            SubmissionPhase::ReadyToSubmit => write!(f, "ReadyToSubmit"),
            SubmissionPhase::Submitting => write!(f, "Submitting"),
            SubmissionPhase::Submitted => write!(f, "Submitted"),
        }
    }
}

/// Rules applied by `submit`.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    /// Reject rosters with fewer than `MAX_ROSTER_SIZE` selections.
    pub require_full_roster: bool,
    /// Gateway calls running longer than this fail with `Timeout`.
    pub timeout: Duration,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            require_full_roster: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Why a submit attempt was refused or failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Roster is empty")]
    EmptyRoster,

    #[error("Roster has {have} of {need} selections")]
    IncompleteRoster { have: usize, need: usize },

    #[error("Contest #{contest_id} is {state}; submissions are closed")]
    InvalidContestState { contest_id: u64, state: ContestState },

    #[error("Roster already submitted or a submission is in flight")]
    DuplicateSubmission,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Observable view of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SubmissionPhase,
    pub selections: Vec<Selection>,
    pub is_submitted: bool,
    pub last_submission: Option<Submission>,
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SessionState {
    roster: RosterManager,
    is_submitted: bool,
    in_flight: bool,
    last_submission: Option<Submission>,
}

impl SessionState {
    fn phase(&self) -> SubmissionPhase {
        if self.is_submitted {
            SubmissionPhase::Submitted
        } else if self.in_flight {
            SubmissionPhase::Submitting
        } else if self.roster.is_empty() {
            SubmissionPhase::Empty
        } else if self.roster.is_full() {
            SubmissionPhase::ReadyToSubmit
        } else {
            SubmissionPhase::Building
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            selections: self.roster.selections().to_vec(),
            is_submitted: self.is_submitted,
            last_submission: self.last_submission.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Single owner of the session roster and its submission state.
///
/// Shared behind an `Arc`; every method takes `&self`. At most one
/// gateway call is in flight: a second `submit` while one is pending is
/// rejected with `DuplicateSubmission`.
pub struct SubmissionController {
    gateway: Arc<dyn PersistenceGateway>,
    owner: String,
    policy: SubmissionPolicy,
    state: Mutex<SessionState>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SubmissionController {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        owner: impl Into<String>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self::from_state(gateway, owner.into(), policy, SessionState::default())
    }

    /// Resume a previously saved session. Pending calls are never resumed.
    pub fn restore(
        gateway: Arc<dyn PersistenceGateway>,
        owner: impl Into<String>,
        policy: SubmissionPolicy,
        snapshot: SessionSnapshot,
    ) -> Self {
        let state = SessionState {
            roster: RosterManager::from_selections(snapshot.selections),
            is_submitted: snapshot.is_submitted,
            in_flight: false,
            last_submission: snapshot.last_submission,
        };
        Self::from_state(gateway, owner.into(), policy, state)
    }

    fn from_state(
        gateway: Arc<dyn PersistenceGateway>,
        owner: String,
        policy: SubmissionPolicy,
        state: SessionState,
    ) -> Self {
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            gateway,
            owner,
            policy,
            state: Mutex::new(state),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the session; publish a snapshot only if it changed.
    fn mutate<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        let next = state.snapshot();
        self.updates.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        out
    }

    // -- Queries ---------------------------------------------------------

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn policy(&self) -> &SubmissionPolicy {
        &self.policy
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.lock().phase()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Receive a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub fn is_submitted(&self) -> bool {
        self.lock().is_submitted
    }

    /// Whether a gateway call is pending.
    pub fn is_submitting(&self) -> bool {
        self.lock().in_flight
    }

    pub fn selections(&self) -> Vec<Selection> {
        self.lock().roster.selections().to_vec()
    }

    pub fn is_in_roster(&self, asset: &Asset) -> bool {
        self.lock().roster.is_in_roster(asset)
    }

    pub fn is_full(&self) -> bool {
        self.lock().roster.is_full()
    }

    // -- Roster edits ----------------------------------------------------

    /// Toggle a selection unless the roster is locked by a submission.
    pub fn toggle_selection(&self, asset: &Asset, prediction: Prediction) -> ToggleOutcome {
        self.mutate(|s| {
            if s.phase().is_locked() {
                debug!(asset_id = %asset.id, phase = %s.phase(), "Roster locked, toggle refused");
                return ToggleOutcome::Locked;
            }
            s.roster.toggle_selection(asset, prediction)
        })
    }

    /// Remove an asset unless the roster is locked.
    pub fn remove_asset(&self, asset_id: &str) -> ToggleOutcome {
        self.mutate(|s| {
            if s.phase().is_locked() {
                return ToggleOutcome::Locked;
            }
            if s.roster.remove_asset(asset_id) {
                ToggleOutcome::Removed
            } else {
                ToggleOutcome::Ignored
            }
        })
    }

    /// Empty the roster unless it is locked. Returns whether it was cleared.
    pub fn clear(&self) -> bool {
        self.mutate(|s| {
            if s.phase().is_locked() {
                return false;
            }
            s.roster.clear();
            true
        })
    }

    // -- Submission ------------------------------------------------------

    /// Contests a roster may still be submitted to, in catalog order.
    pub fn list_eligible_contests(all: &[Contest]) -> Vec<Contest> {
        all.iter().filter(|c| c.is_open()).cloned().collect()
    }

    /// Persist the current roster against `contest`.
    ///
    /// Local checks (duplicate, empty, incomplete, contest state) run
    /// before the gateway is touched. On any failure, or if the returned
    /// future is dropped before completion, the session is left exactly
    /// as it was. No automatic retry.
    pub async fn submit(&self, contest: &Contest) -> Result<Submission, SubmissionError> {
        let roster = self.begin_submission(contest)?;
        let guard = InFlightGuard {
            controller: self,
            armed: true,
        };

        info!(
            contest_id = contest.id,
            contest = %contest.name,
            selections = roster.len(),
            owner = %self.owner,
            "Submitting roster"
        );

        let saved = match tokio::time::timeout(
            self.policy.timeout,
            self.gateway.save_submission(&roster, contest.id, &self.owner),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout(self.policy.timeout)),
        };

        let submission = match saved.and_then(|s| verify_persisted(&roster, contest.id, s)) {
            Ok(s) => s,
            Err(e) => {
                warn!(contest_id = contest.id, error = %e, "Submission failed, roster kept");
                return Err(e.into());
            }
        };

        guard.complete(submission.clone());
        info!(
            submission_id = %submission.id,
            contest_id = contest.id,
            "Roster submitted"
        );
        Ok(submission)
    }

    fn begin_submission(&self, contest: &Contest) -> Result<Vec<Selection>, SubmissionError> {
        let require_full = self.policy.require_full_roster;
        self.mutate(|s| {
            if s.is_submitted || s.in_flight {
                return Err(SubmissionError::DuplicateSubmission);
            }
            if s.roster.is_empty() {
                return Err(SubmissionError::EmptyRoster);
            }
            if require_full && !s.roster.is_full() {
                return Err(SubmissionError::IncompleteRoster {
                    have: s.roster.len(),
                    need: MAX_ROSTER_SIZE,
                });
            }
            if !contest.is_open() {
                return Err(SubmissionError::InvalidContestState {
                    contest_id: contest.id,
                    state: contest.state,
                });
            }
            s.in_flight = true;
            Ok(s.roster.selections().to_vec())
        })
    }

    /// Record a gateway-confirmed submission and lock the roster.
    pub fn mark_submitted(&self, submission: Submission) {
        self.mutate(|s| {
            s.in_flight = false;
            s.is_submitted = true;
            s.last_submission = Some(submission);
        });
    }

    /// Start a new round: clears `is_submitted`, keeps the roster.
    pub fn reset_submission(&self) {
        self.mutate(|s| {
            if s.in_flight {
                warn!("Reset requested while a submission is in flight, ignored");
                return;
            }
            if s.is_submitted {
                info!(selections = s.roster.len(), "Submission reset, roster unlocked");
            }
            s.is_submitted = false;
        });
    }
}

/// Clears the in-flight marker unless the submission completed.
struct InFlightGuard<'a> {
    controller: &'a SubmissionController,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn complete(mut self, submission: Submission) {
        self.armed = false;
        self.controller.mark_submitted(submission);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.controller.mutate(|s| s.in_flight = false);
        }
    }
}

/// Check that the gateway stored exactly what was sent.
fn verify_persisted(
    sent: &[Selection],
    contest_id: u64,
    stored: Submission,
) -> Result<Submission, PersistenceError> {
    if stored.roster_snapshot.len() != sent.len() {
        return Err(PersistenceError::PartialWrite {
            expected: sent.len(),
            stored: stored.roster_snapshot.len(),
        });
    }
    if stored.roster_snapshot != sent {
        // Same length but out of order or altered: count what landed intact.
        let intact = sent
            .iter()
            .zip(&stored.roster_snapshot)
            .filter(|(a, b)| a == b)
            .count();
        return Err(PersistenceError::PartialWrite {
            expected: sent.len(),
            stored: intact,
        });
    }
    if stored.contest_id != contest_id {
        return Err(PersistenceError::Schema(format!(
            "stored contest #{} instead of #{contest_id}",
            stored.contest_id
        )));
    }
    Ok(stored)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
