use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::{stream, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use shared::{is_day_closed, local_date, LedgerEntry, Pact, PactEvent, PactId, PactStatus, UserId};

use crate::collaborators::{NotificationDispatcher, TelemetryError, TelemetrySource};
use crate::config::EnginePolicy;
use crate::retry::{with_backoff, Backoff};
use crate::store::{EvaluationUpdate, PactStore, StoreError};

mod decision;

pub use decision::{decide_day, DayVerdict};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("pact {0} not found")]
    PactNotFound(PactId),
    #[error("{user} is not a participant of pact {pact_id}")]
    NotAParticipant { pact_id: PactId, user: UserId },
    #[error("pact {} is not active", .pact.id)]
    PactInactive { pact: Box<Pact> },
    #[error("{user} cannot report progress for {date} before it starts on their clock")]
    FutureDate { user: UserId, date: NaiveDate },
    #[error("active pact {0} has no evaluation cursor")]
    MissingCursor(PactId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one Pact contributed to a sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct PactOutcome {
    pub days_evaluated: usize,
    pub days_advanced: usize,
    pub streaks_broken: usize,
    pub ended: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepSummary {
    pub pacts_seen: usize,
    pub days_evaluated: usize,
    pub days_advanced: usize,
    pub streaks_broken: usize,
    pub pacts_ended: usize,
    pub invitations_expired: usize,
    pub failures: usize,
}

/// The daily evaluation engine. Runs from two triggers: the scheduled sweep
/// over every active Pact, and progress reports arriving for a single Pact.
/// Either way, each Pact advances through its unevaluated closed dates in
/// strict order, one compare-and-swapped commit per date.
pub struct EvaluationEngine {
    store: Arc<dyn PactStore>,
    telemetry: Arc<dyn TelemetrySource>,
    notifier: Arc<dyn NotificationDispatcher>,
    policy: EnginePolicy,
    backoff: Backoff,
}

impl EvaluationEngine {
    pub fn new(
        store: Arc<dyn PactStore>,
        telemetry: Arc<dyn TelemetrySource>,
        notifier: Arc<dyn NotificationDispatcher>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            store,
            telemetry,
            notifier,
            policy,
            backoff: Backoff::default(),
        }
    }

    /// One pass over the whole estate: expire stale invitations, then
    /// evaluate independent Pacts in parallel. Failures are isolated per
    /// Pact; the sweep itself never aborts.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        self.expire_stale_invitations(now, &mut summary).await;

        let ids = match self.store.active_pact_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("failed to list active pacts: {e}");
                summary.failures += 1;
                return summary;
            }
        };
        summary.pacts_seen = ids.len();

        let results = stream::iter(ids)
            .map(|id| async move { (id, self.evaluate_pact(id, now).await) })
            .buffer_unordered(self.policy.sweep_workers.max(1))
            .collect::<Vec<_>>()
            .await;

        for (id, result) in results {
            match result {
                Ok(outcome) => {
                    summary.days_evaluated += outcome.days_evaluated;
                    summary.days_advanced += outcome.days_advanced;
                    summary.streaks_broken += outcome.streaks_broken;
                    summary.pacts_ended += usize::from(outcome.ended);
                }
                Err(e) => {
                    error!("evaluation failed for pact {id}: {e}");
                    summary.failures += 1;
                }
            }
        }

        info!(
            "sweep finished: {} pacts, {} days evaluated, {} advanced, {} broken, {} expired invites, {} failures",
            summary.pacts_seen,
            summary.days_evaluated,
            summary.days_advanced,
            summary.streaks_broken,
            summary.invitations_expired,
            summary.failures,
        );
        summary
    }

    /// Walks one Pact forward through every date that is closed for both
    /// participants and not yet evaluated, oldest first. Stops at the first
    /// date that is still open or awaiting reports, or when another worker
    /// wins the commit race.
    #[instrument(skip(self))]
    pub async fn evaluate_pact(
        &self,
        pact_id: PactId,
        now: DateTime<Utc>,
    ) -> Result<PactOutcome, EvaluationError> {
        let mut outcome = PactOutcome::default();

        loop {
            let Some(pact) = self.store.pact(pact_id).await? else {
                break;
            };
            if !pact.status.accepts_evaluation() {
                break;
            }
            let cursor = pact
                .last_evaluated_date
                .ok_or(EvaluationError::MissingCursor(pact_id))?;
            let Some(candidate) = cursor.succ_opt() else {
                break;
            };
            if !pact
                .participants()
                .iter()
                .all(|p| is_day_closed(candidate, p.utc_offset_minutes, now))
            {
                break;
            }

            self.ingest_telemetry(&pact, candidate, now).await?;
            let entries = self
                .store
                .ledger_entries_for_date(pact_id, candidate)
                .await?;

            match decide_day(&pact, candidate, &entries, self.policy.grace_hours, now) {
                DayVerdict::Open | DayVerdict::Pending => break,
                DayVerdict::Qualified => {
                    let mut updated = pact.clone();
                    updated.record_qualifying_day(candidate);
                    if !self.commit(&updated, pact.last_evaluated_date).await? {
                        break;
                    }
                    outcome.days_evaluated += 1;
                    outcome.days_advanced += 1;
                    self.notifier.dispatch(PactEvent::StreakAdvanced {
                        pact_id,
                        date: candidate,
                        streak_count: updated.streak_count,
                        longest_streak: updated.longest_streak,
                    });
                }
                DayVerdict::Missed { missed_by } => {
                    let prior_streak = pact.streak_count;
                    let mut updated = pact.clone();
                    updated.record_missed_day(candidate);
                    updated.resolve_break(self.policy.max_consecutive_misses);
                    if !self.commit(&updated, pact.last_evaluated_date).await? {
                        break;
                    }
                    outcome.days_evaluated += 1;
                    outcome.streaks_broken += 1;
                    self.notifier.dispatch(PactEvent::StreakBroken {
                        pact_id,
                        date: candidate,
                        prior_streak,
                        missed_by,
                    });
                    if updated.status.is_terminal() {
                        outcome.ended = true;
                        self.notifier.dispatch(PactEvent::PactEnded {
                            pact_id,
                            status: updated.status,
                        });
                        break;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Client-supplied progress: the ingestion path for `Custom`
    /// commitments and for clients shipping their own counts. Upserts the
    /// ledger entry and immediately re-evaluates the Pact.
    #[instrument(skip(self))]
    pub async fn report_progress(
        &self,
        pact_id: PactId,
        participant_id: &str,
        date: NaiveDate,
        progress_value: u32,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, EvaluationError> {
        let pact = self
            .store
            .pact(pact_id)
            .await?
            .ok_or(EvaluationError::PactNotFound(pact_id))?;
        let Some(participant) = pact.participant(participant_id) else {
            return Err(EvaluationError::NotAParticipant {
                pact_id,
                user: participant_id.to_string(),
            });
        };
        if !pact.status.accepts_evaluation() {
            return Err(EvaluationError::PactInactive {
                pact: Box::new(pact),
            });
        }
        if date > local_date(now, participant.utc_offset_minutes) {
            return Err(EvaluationError::FutureDate {
                user: participant_id.to_string(),
                date,
            });
        }

        let entry = LedgerEntry::record(
            &pact,
            participant.user_id.clone(),
            date,
            progress_value,
            now,
        );
        with_backoff("ledger upsert", &self.backoff, || {
            self.store.upsert_ledger_entry(&entry)
        })
        .await?;

        self.evaluate_pact(pact_id, now).await?;
        Ok(entry)
    }

    /// Pulls fresh counts for any participant who does not yet have a met
    /// entry for `date`. A met entry is final; an unmet or absent one may
    /// still be improved by a late-syncing client until grace runs out.
    async fn ingest_telemetry(
        &self,
        pact: &Pact,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), EvaluationError> {
        if !pact.commitment_type.has_telemetry() {
            return Ok(());
        }

        let existing = self.store.ledger_entries_for_date(pact.id, date).await?;
        for participant in pact.participants() {
            let current = existing
                .iter()
                .find(|e| e.participant_id == participant.user_id);
            if current.is_some_and(|e| e.met_target) {
                continue;
            }

            match self
                .telemetry
                .daily_progress(&participant.user_id, &pact.commitment_type, date)
                .await
            {
                Ok(progress) => {
                    if current.map(|e| e.progress_value) == Some(progress) {
                        continue;
                    }
                    let entry = LedgerEntry::record(
                        pact,
                        participant.user_id.clone(),
                        date,
                        progress,
                        now,
                    );
                    with_backoff("ledger upsert", &self.backoff, || {
                        self.store.upsert_ledger_entry(&entry)
                    })
                    .await?;
                }
                Err(TelemetryError::Unavailable(reason)) => {
                    // Not a miss; the day stays unreported until grace.
                    debug!(
                        "telemetry for {} on {date} not yet available: {reason}",
                        participant.user_id
                    );
                }
            }
        }
        Ok(())
    }

    async fn commit(
        &self,
        updated: &Pact,
        prior_evaluated_date: Option<NaiveDate>,
    ) -> Result<bool, StoreError> {
        let update = EvaluationUpdate::from_pact(updated, prior_evaluated_date);
        with_backoff("evaluation commit", &self.backoff, || {
            self.store.commit_evaluation(&update)
        })
        .await
    }

    async fn expire_stale_invitations(&self, now: DateTime<Utc>, summary: &mut SweepSummary) {
        let cutoff = now - Duration::days(self.policy.invitation_ttl_days as i64);
        let stale = match self.store.pending_pacts_created_before(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                error!("failed to list stale invitations: {e}");
                summary.failures += 1;
                return;
            }
        };

        for pact in stale {
            let pact_id = pact.id;
            let mut updated = pact;
            updated.status = PactStatus::Declined;
            match self
                .store
                .transition(&updated, PactStatus::PendingAcceptance)
                .await
            {
                Ok(true) => {
                    summary.invitations_expired += 1;
                    self.notifier.dispatch(PactEvent::InviteExpired { pact_id });
                }
                Ok(false) => {}
                Err(e) => {
                    error!("failed to expire invitation for pact {pact_id}: {e}");
                    summary.failures += 1;
                }
            }
        }
    }
}
