use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use shared::{LedgerEntry, Pact, PactId, PactStatus, UserId};

use super::{reject_transitional, EvaluationUpdate, PactStore, StoreError};

/// In-memory store with the same compare-and-swap semantics as the
/// PostgreSQL implementation. Backs the engine test harness; useful for
/// downstream tests that don't want a database.
#[derive(Default)]
pub struct MemoryPactStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pacts: HashMap<PactId, Pact>,
    ledger: BTreeMap<(PactId, UserId, NaiveDate), LedgerEntry>,
}

#[async_trait]
impl PactStore for MemoryPactStore {
    async fn insert_pact(&self, pact: &Pact) -> Result<(), StoreError> {
        reject_transitional(pact.status)?;
        let mut inner = self.inner.lock().await;
        if inner.pacts.contains_key(&pact.id) {
            return Err(StoreError::Integrity(format!(
                "uniqueness violation: pact {} already exists",
                pact.id
            )));
        }
        inner.pacts.insert(pact.id, pact.clone());
        Ok(())
    }

    async fn pact(&self, id: PactId) -> Result<Option<Pact>, StoreError> {
        Ok(self.inner.lock().await.pacts.get(&id).cloned())
    }

    async fn transition(&self, pact: &Pact, expected: PactStatus) -> Result<bool, StoreError> {
        reject_transitional(pact.status)?;
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.pacts.get_mut(&pact.id) else {
            return Ok(false);
        };
        if stored.status != expected {
            return Ok(false);
        }
        stored.status = pact.status;
        stored.responded_at = pact.responded_at;
        stored.last_evaluated_date = pact.last_evaluated_date;
        stored.participant_a.utc_offset_minutes = pact.participant_a.utc_offset_minutes;
        stored.participant_b.utc_offset_minutes = pact.participant_b.utc_offset_minutes;
        Ok(true)
    }

    async fn active_pact_ids(&self) -> Result<Vec<PactId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .pacts
            .values()
            .filter(|p| p.status == PactStatus::Active)
            .map(|p| p.id)
            .collect())
    }

    async fn pending_pacts_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Pact>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .pacts
            .values()
            .filter(|p| p.status == PactStatus::PendingAcceptance && p.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn upsert_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let key = (entry.pact_id, entry.participant_id.clone(), entry.date);
        self.inner.lock().await.ledger.insert(key, entry.clone());
        Ok(())
    }

    async fn ledger_entries_for_date(
        &self,
        pact_id: PactId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .ledger
            .values()
            .filter(|e| e.pact_id == pact_id && e.date == date)
            .cloned()
            .collect())
    }

    async fn ledger_history(
        &self,
        pact_id: PactId,
        before: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .ledger
            .values()
            .filter(|e| e.pact_id == pact_id)
            .filter(|e| before.map_or(true, |cursor| e.date < cursor))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn commit_evaluation(&self, update: &EvaluationUpdate) -> Result<bool, StoreError> {
        reject_transitional(update.status)?;
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.pacts.get_mut(&update.pact_id) else {
            return Ok(false);
        };
        if stored.status != PactStatus::Active
            || stored.last_evaluated_date != update.prior_evaluated_date
        {
            return Ok(false);
        }
        stored.streak_count = update.streak_count;
        stored.longest_streak = update.longest_streak;
        stored.consecutive_misses = update.consecutive_misses;
        stored.status = update.status;
        stored.last_evaluated_date = Some(update.evaluated_date);
        Ok(true)
    }
}
