use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use shared::{LedgerEntry, Pact, PactId, PactStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryPactStore;
pub use postgres::PgPactStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Infrastructure trouble; callers retry with backoff.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A broken invariant (duplicate ledger row, cursor regression, a
    /// transitional status reaching disk). Never retried, always surfaced.
    #[error("data integrity violation: {0}")]
    Integrity(String),
}

impl StoreError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Integrity(format!("uniqueness violation: {db}"))
            }
            _ => Self::Unavailable(e.to_string()),
        }
    }
}

/// Everything one evaluated day changes on the Pact row, committed as a
/// single compare-and-swap keyed on the evaluation cursor. Two workers
/// racing on the same Pact cannot both win the swap, which is the only
/// mutual exclusion evaluation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationUpdate {
    pub pact_id: PactId,
    /// Cursor value the decision was computed against.
    pub prior_evaluated_date: Option<NaiveDate>,
    pub evaluated_date: NaiveDate,
    pub streak_count: u32,
    pub longest_streak: u32,
    pub consecutive_misses: u32,
    pub status: PactStatus,
}

impl EvaluationUpdate {
    pub fn from_pact(pact: &Pact, prior_evaluated_date: Option<NaiveDate>) -> Self {
        Self {
            pact_id: pact.id,
            prior_evaluated_date,
            evaluated_date: pact.last_evaluated_date.unwrap_or(NaiveDate::MIN),
            streak_count: pact.streak_count,
            longest_streak: pact.longest_streak,
            consecutive_misses: pact.consecutive_misses,
            status: pact.status,
        }
    }
}

/// The single source of truth for Pacts and their completion ledger. All
/// mutation flows through the lifecycle manager or the evaluation engine;
/// presentation code only ever reads.
#[async_trait]
pub trait PactStore: Send + Sync {
    async fn insert_pact(&self, pact: &Pact) -> Result<(), StoreError>;

    async fn pact(&self, id: PactId) -> Result<Option<Pact>, StoreError>;

    /// Writes the lifecycle-mutable fields of `pact` iff the stored status
    /// still equals `expected`. Returns whether the write applied; a lost
    /// race leaves the row untouched.
    async fn transition(&self, pact: &Pact, expected: PactStatus) -> Result<bool, StoreError>;

    async fn active_pact_ids(&self) -> Result<Vec<PactId>, StoreError>;

    async fn pending_pacts_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pact>, StoreError>;

    /// Upsert keyed on `(pact_id, participant_id, date)`; re-recording a
    /// day replaces the progress value and its derived `met_target`.
    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn ledger_entries_for_date(
        &self,
        pact_id: PactId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Most-recent-first page of the completion ledger; pass the oldest
    /// date already seen as `before` to restart and continue the walk.
    async fn ledger_history(
        &self,
        pact_id: PactId,
        before: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Commits one evaluated day. Returns `false` when the cursor moved
    /// underneath us (another worker already evaluated the date) or the
    /// Pact stopped being active; both mean "drop the update silently".
    async fn commit_evaluation(&self, update: &EvaluationUpdate) -> Result<bool, StoreError>;
}

/// Shared guard: the transitional break marker must never reach disk.
pub(crate) fn reject_transitional(status: PactStatus) -> Result<(), StoreError> {
    if status.is_transitional() {
        return Err(StoreError::Integrity(format!(
            "attempted to persist transitional status {status}"
        )));
    }
    Ok(())
}
