use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Pact, PactId, UserId};

/// One participant's durable progress record for one local calendar day of
/// one Pact. At most one entry exists per `(pact_id, participant_id, date)`;
/// writes are upserts on that key, so re-recording a day is idempotent and a
/// later report simply re-derives `met_target` from the fresher value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub pact_id: PactId,
    pub participant_id: UserId,
    /// The participant's own local calendar date, never a shared UTC day.
    pub date: NaiveDate,
    pub progress_value: u32,
    pub met_target: bool,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn record(
        pact: &Pact,
        participant_id: UserId,
        date: NaiveDate,
        progress_value: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pact_id: pact.id,
            participant_id,
            date,
            met_target: pact
                .commitment_type
                .is_met(progress_value, pact.target_value),
            progress_value,
            recorded_at,
        }
    }
}
