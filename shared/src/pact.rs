use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{CommitmentType, PactId, UserId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PactStatus {
    PendingAcceptance,
    Active,
    Declined,
    BrokenStreak,
    EndedByMutualAgreement,
    EndedUnilaterally,
}

impl PactStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Declined | Self::EndedByMutualAgreement | Self::EndedUnilaterally
        )
    }

    /// Only `Active` Pacts may have their streak mutated by evaluation.
    pub const fn accepts_evaluation(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// `BrokenStreak` lives only between a miss verdict and its resolution
    /// within the same evaluation step; it must never reach the store.
    pub const fn is_transitional(&self) -> bool {
        matches!(self, Self::BrokenStreak)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactParticipant {
    pub user_id: UserId,
    /// Offset of the participant's local clock from UTC, snapshotted from
    /// their directory profile. Defines where their calendar day ends.
    pub utc_offset_minutes: i32,
}

impl PactParticipant {
    pub fn new(user_id: impl Into<UserId>, utc_offset_minutes: i32) -> Self {
        Self {
            user_id: user_id.into(),
            utc_offset_minutes,
        }
    }
}

/// A bilateral daily-commitment agreement between two users.
///
/// The participant pair is stored ordered by user id so that the same two
/// users always produce the same row regardless of who initiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pact {
    pub id: PactId,
    pub participant_a: PactParticipant,
    pub participant_b: PactParticipant,
    pub initiated_by: UserId,
    pub commitment_type: CommitmentType,
    pub target_value: u32,
    pub status: PactStatus,
    pub streak_count: u32,
    pub longest_streak: u32,
    pub consecutive_misses: u32,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub last_evaluated_date: Option<NaiveDate>,
}

impl Pact {
    pub fn new(
        initiator: PactParticipant,
        partner: PactParticipant,
        commitment_type: CommitmentType,
        target_value: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        let initiated_by = initiator.user_id.clone();
        let (participant_a, participant_b) = if initiator.user_id <= partner.user_id {
            (initiator, partner)
        } else {
            (partner, initiator)
        };

        Self {
            id: PactId::new_v4(),
            participant_a,
            participant_b,
            initiated_by,
            commitment_type,
            target_value,
            status: PactStatus::PendingAcceptance,
            streak_count: 0,
            longest_streak: 0,
            consecutive_misses: 0,
            created_at,
            responded_at: None,
            last_evaluated_date: None,
        }
    }

    pub fn participants(&self) -> [&PactParticipant; 2] {
        [&self.participant_a, &self.participant_b]
    }

    pub fn participant(&self, user_id: &str) -> Option<&PactParticipant> {
        self.participants()
            .into_iter()
            .find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    /// The participant who received the invitation.
    pub fn invitee(&self) -> &PactParticipant {
        if self.participant_a.user_id == self.initiated_by {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }

    /// A qualifying day extends the streak and raises the high-water mark.
    pub fn record_qualifying_day(&mut self, date: NaiveDate) {
        self.streak_count += 1;
        self.longest_streak = self.longest_streak.max(self.streak_count);
        self.consecutive_misses = 0;
        self.last_evaluated_date = Some(date);
    }

    /// A missed day resets the streak for both sides and parks the Pact in
    /// the transitional `BrokenStreak` state until `resolve_break` runs.
    pub fn record_missed_day(&mut self, date: NaiveDate) {
        self.streak_count = 0;
        self.consecutive_misses += 1;
        self.last_evaluated_date = Some(date);
        self.status = PactStatus::BrokenStreak;
    }

    /// Leaves `BrokenStreak`: back to `Active`, or terminal once the
    /// configured strike budget is exhausted.
    pub fn resolve_break(&mut self, max_consecutive_misses: Option<u32>) {
        self.status = match max_consecutive_misses {
            Some(max) if self.consecutive_misses >= max => PactStatus::EndedUnilaterally,
            _ => PactStatus::Active,
        };
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn pact(initiator: &str, partner: &str) -> Pact {
        Pact::new(
            PactParticipant::new(initiator, 0),
            PactParticipant::new(partner, 0),
            CommitmentType::DailyTasks,
            3,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn participant_pair_is_ordered_regardless_of_initiator() {
        let from_bea = pact("bea", "avery");
        assert_eq!(from_bea.participant_a.user_id, "avery");
        assert_eq!(from_bea.participant_b.user_id, "bea");
        assert_eq!(from_bea.initiated_by, "bea");
        assert_eq!(from_bea.invitee().user_id, "avery");

        let from_avery = pact("avery", "bea");
        assert_eq!(from_avery.participant_a.user_id, "avery");
        assert_eq!(from_avery.invitee().user_id, "bea");
    }

    #[test]
    fn streak_accounting() {
        let mut pact = pact("avery", "bea");
        pact.status = PactStatus::Active;
        let day = |d: u32| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();

        for d in 1..=4 {
            pact.record_qualifying_day(day(d));
        }
        assert_eq!(pact.streak_count, 4);
        assert_eq!(pact.longest_streak, 4);

        pact.record_missed_day(day(5));
        assert_eq!(pact.status, PactStatus::BrokenStreak);
        pact.resolve_break(None);
        assert_eq!(pact.status, PactStatus::Active);
        assert_eq!(pact.streak_count, 0);
        assert_eq!(pact.longest_streak, 4);
        assert_eq!(pact.consecutive_misses, 1);

        pact.record_qualifying_day(day(6));
        assert_eq!(pact.streak_count, 1);
        assert_eq!(pact.longest_streak, 4);
        assert_eq!(pact.consecutive_misses, 0);
        assert!(pact.streak_count <= pact.longest_streak);
    }

    #[test]
    fn strike_budget_terminates() {
        let mut pact = pact("avery", "bea");
        pact.status = PactStatus::Active;
        let day = |d: u32| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();

        pact.record_missed_day(day(1));
        pact.resolve_break(Some(2));
        assert_eq!(pact.status, PactStatus::Active);

        pact.record_missed_day(day(2));
        pact.resolve_break(Some(2));
        assert_eq!(pact.status, PactStatus::EndedUnilaterally);
        assert!(pact.status.is_terminal());
    }

    #[test]
    fn status_predicates() {
        assert!(PactStatus::Active.accepts_evaluation());
        assert!(!PactStatus::PendingAcceptance.accepts_evaluation());
        assert!(PactStatus::BrokenStreak.is_transitional());
        assert!(!PactStatus::Declined.accepts_evaluation());
        assert!(PactStatus::EndedByMutualAgreement.is_terminal());
    }
}
