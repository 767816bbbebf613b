use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use shared::{CommitmentType, LedgerEntry, Pact, PactId, PactParticipant, PactStatus};

use super::{reject_transitional, EvaluationUpdate, PactStore, StoreError};

const PACT_COLUMNS: &str = "id, participant_a, participant_a_offset_minutes, \
     participant_b, participant_b_offset_minutes, initiated_by, \
     commitment_type, custom_description, target_value, status, \
     streak_count, longest_streak, consecutive_misses, \
     created_at, responded_at, last_evaluated_date";

const LEDGER_COLUMNS: &str =
    "pact_id, participant_id, date, progress_value, met_target, recorded_at";

/// Production record store on PostgreSQL. The ledger primary key enforces
/// the one-entry-per-participant-per-day invariant at the storage layer.
#[derive(Clone, Debug)]
pub struct PgPactStore {
    pool: PgPool,
}

impl PgPactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PactRow {
    id: PactId,
    participant_a: String,
    participant_a_offset_minutes: i32,
    participant_b: String,
    participant_b_offset_minutes: i32,
    initiated_by: String,
    commitment_type: String,
    custom_description: Option<String>,
    target_value: i32,
    status: String,
    streak_count: i32,
    longest_streak: i32,
    consecutive_misses: i32,
    created_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    last_evaluated_date: Option<NaiveDate>,
}

impl TryFrom<PactRow> for Pact {
    type Error = StoreError;

    fn try_from(row: PactRow) -> Result<Self, Self::Error> {
        let commitment_type =
            CommitmentType::from_parts(&row.commitment_type, row.custom_description).ok_or_else(
                || StoreError::Integrity(format!("unknown commitment type {}", row.commitment_type)),
            )?;
        let status = row
            .status
            .parse::<PactStatus>()
            .map_err(|_| StoreError::Integrity(format!("unknown pact status {}", row.status)))?;

        Ok(Pact {
            id: row.id,
            participant_a: PactParticipant::new(row.participant_a, row.participant_a_offset_minutes),
            participant_b: PactParticipant::new(row.participant_b, row.participant_b_offset_minutes),
            initiated_by: row.initiated_by,
            commitment_type,
            target_value: row.target_value as u32,
            status,
            streak_count: row.streak_count as u32,
            longest_streak: row.longest_streak as u32,
            consecutive_misses: row.consecutive_misses as u32,
            created_at: row.created_at,
            responded_at: row.responded_at,
            last_evaluated_date: row.last_evaluated_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    pact_id: PactId,
    participant_id: String,
    date: NaiveDate,
    progress_value: i32,
    met_target: bool,
    recorded_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            pact_id: row.pact_id,
            participant_id: row.participant_id,
            date: row.date,
            progress_value: row.progress_value as u32,
            met_target: row.met_target,
            recorded_at: row.recorded_at,
        }
    }
}

#[async_trait]
impl PactStore for PgPactStore {
    async fn insert_pact(&self, pact: &Pact) -> Result<(), StoreError> {
        reject_transitional(pact.status)?;
        sqlx::query(
            "INSERT INTO pacts (id, participant_a, participant_a_offset_minutes, \
             participant_b, participant_b_offset_minutes, initiated_by, \
             commitment_type, custom_description, target_value, status, \
             streak_count, longest_streak, consecutive_misses, \
             created_at, responded_at, last_evaluated_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(pact.id)
        .bind(&pact.participant_a.user_id)
        .bind(pact.participant_a.utc_offset_minutes)
        .bind(&pact.participant_b.user_id)
        .bind(pact.participant_b.utc_offset_minutes)
        .bind(&pact.initiated_by)
        .bind(pact.commitment_type.kind_label())
        .bind(pact.commitment_type.custom_description())
        .bind(pact.target_value as i32)
        .bind(pact.status.to_string())
        .bind(pact.streak_count as i32)
        .bind(pact.longest_streak as i32)
        .bind(pact.consecutive_misses as i32)
        .bind(pact.created_at)
        .bind(pact.responded_at)
        .bind(pact.last_evaluated_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pact(&self, id: PactId) -> Result<Option<Pact>, StoreError> {
        let row = sqlx::query_as::<_, PactRow>(&format!(
            "SELECT {PACT_COLUMNS} FROM pacts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Pact::try_from).transpose()
    }

    async fn transition(&self, pact: &Pact, expected: PactStatus) -> Result<bool, StoreError> {
        reject_transitional(pact.status)?;
        let result = sqlx::query(
            "UPDATE pacts \
             SET status = $2, responded_at = $3, last_evaluated_date = $4, \
                 participant_a_offset_minutes = $5, participant_b_offset_minutes = $6 \
             WHERE id = $1 AND status = $7",
        )
        .bind(pact.id)
        .bind(pact.status.to_string())
        .bind(pact.responded_at)
        .bind(pact.last_evaluated_date)
        .bind(pact.participant_a.utc_offset_minutes)
        .bind(pact.participant_b.utc_offset_minutes)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn active_pact_ids(&self) -> Result<Vec<PactId>, StoreError> {
        let ids = sqlx::query_scalar::<_, PactId>("SELECT id FROM pacts WHERE status = $1")
            .bind(PactStatus::Active.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn pending_pacts_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pact>, StoreError> {
        let rows = sqlx::query_as::<_, PactRow>(&format!(
            "SELECT {PACT_COLUMNS} FROM pacts WHERE status = $1 AND created_at < $2"
        ))
        .bind(PactStatus::PendingAcceptance.to_string())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Pact::try_from).collect()
    }

    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // First try to update the entry for the day
        let updated = sqlx::query(
            "UPDATE pact_ledger_entries \
             SET progress_value = $4, met_target = $5, recorded_at = $6 \
             WHERE pact_id = $1 AND participant_id = $2 AND date = $3",
        )
        .bind(entry.pact_id)
        .bind(&entry.participant_id)
        .bind(entry.date)
        .bind(entry.progress_value as i32)
        .bind(entry.met_target)
        .bind(entry.recorded_at)
        .execute(tx.as_mut())
        .await?;

        // If the update did not find a matching row, insert the entry
        if updated.rows_affected() == 0 {
            let inserted = sqlx::query(
                "INSERT INTO pact_ledger_entries \
                 (pact_id, participant_id, date, progress_value, met_target, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (pact_id, participant_id, date) DO NOTHING",
            )
            .bind(entry.pact_id)
            .bind(&entry.participant_id)
            .bind(entry.date)
            .bind(entry.progress_value as i32)
            .bind(entry.met_target)
            .bind(entry.recorded_at)
            .execute(tx.as_mut())
            .await?;

            // Lost the insert race to a concurrent writer; land as an update
            if inserted.rows_affected() == 0 {
                sqlx::query(
                    "UPDATE pact_ledger_entries \
                     SET progress_value = $4, met_target = $5, recorded_at = $6 \
                     WHERE pact_id = $1 AND participant_id = $2 AND date = $3",
                )
                .bind(entry.pact_id)
                .bind(&entry.participant_id)
                .bind(entry.date)
                .bind(entry.progress_value as i32)
                .bind(entry.met_target)
                .bind(entry.recorded_at)
                .execute(tx.as_mut())
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn ledger_entries_for_date(
        &self,
        pact_id: PactId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM pact_ledger_entries \
             WHERE pact_id = $1 AND date = $2"
        ))
        .bind(pact_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    async fn ledger_history(
        &self,
        pact_id: PactId,
        before: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM pact_ledger_entries \
             WHERE pact_id = $1 AND ($2::date IS NULL OR date < $2) \
             ORDER BY date DESC, participant_id ASC \
             LIMIT $3"
        ))
        .bind(pact_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    async fn commit_evaluation(&self, update: &EvaluationUpdate) -> Result<bool, StoreError> {
        reject_transitional(update.status)?;
        let result = sqlx::query(
            "UPDATE pacts \
             SET streak_count = $2, longest_streak = $3, consecutive_misses = $4, \
                 status = $5, last_evaluated_date = $6 \
             WHERE id = $1 AND status = $7 \
               AND last_evaluated_date IS NOT DISTINCT FROM $8",
        )
        .bind(update.pact_id)
        .bind(update.streak_count as i32)
        .bind(update.longest_streak as i32)
        .bind(update.consecutive_misses as i32)
        .bind(update.status.to_string())
        .bind(update.evaluated_date)
        .bind(PactStatus::Active.to_string())
        .bind(update.prior_evaluated_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
