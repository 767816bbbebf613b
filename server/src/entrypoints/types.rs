use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use shared::{CommitmentType, LedgerEntry, Pact, PactId, PactParticipant};

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CreatePactRequest {
    pub initiator: String,
    pub partner: String,
    /// One of `daily_tasks`, `focus_minutes`, `goal_progress`, `custom`.
    pub commitment_type: String,
    pub custom_description: Option<String>,
    /// Defaults to the catalog default for the commitment type.
    pub target_value: Option<u32>,
}

impl CreatePactRequest {
    pub fn commitment(&self) -> Option<CommitmentType> {
        CommitmentType::from_parts(&self.commitment_type, self.custom_description.clone())
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct RespondRequest {
    pub responder: String,
    pub accept: bool,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub requester: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct EndRequest {
    pub requester: String,
    pub mutual: bool,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReportProgressRequest {
    pub participant: String,
    /// The participant's local calendar date the progress belongs to.
    pub date: NaiveDate,
    pub progress_value: u32,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub utc_offset_minutes: i32,
}

impl From<&PactParticipant> for ParticipantResponse {
    fn from(participant: &PactParticipant) -> Self {
        Self {
            user_id: participant.user_id.clone(),
            utc_offset_minutes: participant.utc_offset_minutes,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PactResponse {
    pub id: PactId,
    pub participants: Vec<ParticipantResponse>,
    pub initiated_by: String,
    pub commitment_type: String,
    pub custom_description: Option<String>,
    pub target_value: u32,
    pub unit_label: String,
    pub status: String,
    pub streak_count: u32,
    pub longest_streak: u32,
    pub consecutive_misses: u32,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub last_evaluated_date: Option<NaiveDate>,
}

impl From<Pact> for PactResponse {
    fn from(pact: Pact) -> Self {
        Self {
            id: pact.id,
            participants: pact.participants().into_iter().map(Into::into).collect(),
            initiated_by: pact.initiated_by.clone(),
            commitment_type: pact.commitment_type.kind_label().to_string(),
            custom_description: pact
                .commitment_type
                .custom_description()
                .map(str::to_string),
            target_value: pact.target_value,
            unit_label: pact.commitment_type.unit_label().to_string(),
            status: pact.status.to_string(),
            streak_count: pact.streak_count,
            longest_streak: pact.longest_streak,
            consecutive_misses: pact.consecutive_misses,
            created_at: pact.created_at,
            responded_at: pact.responded_at,
            last_evaluated_date: pact.last_evaluated_date,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub participant_id: String,
    pub date: NaiveDate,
    pub progress_value: u32,
    pub met_target: bool,
    pub recorded_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            participant_id: entry.participant_id,
            date: entry.date,
            progress_value: entry.progress_value,
            met_target: entry.met_target,
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Authoritative snapshot attached to state conflicts so the client can
    /// reconcile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pact: Option<PactResponse>,
}
