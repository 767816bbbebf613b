use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{PactId, PactStatus, UserId};

/// Signals the engine hands to the notification dispatcher and the UI.
/// Dispatch is fire-and-forget; none of the producing operations fail when a
/// consumer is down.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum PactEvent {
    InviteSent {
        pact_id: PactId,
        initiator: UserId,
        invitee: UserId,
    },
    InviteCancelled {
        pact_id: PactId,
    },
    InviteExpired {
        pact_id: PactId,
    },
    PactAccepted {
        pact_id: PactId,
    },
    PactDeclined {
        pact_id: PactId,
    },
    StreakAdvanced {
        pact_id: PactId,
        date: NaiveDate,
        streak_count: u32,
        longest_streak: u32,
    },
    StreakBroken {
        pact_id: PactId,
        date: NaiveDate,
        prior_streak: u32,
        missed_by: Vec<UserId>,
    },
    PactEnded {
        pact_id: PactId,
        status: PactStatus,
    },
}

impl PactEvent {
    pub const fn pact_id(&self) -> PactId {
        match self {
            Self::InviteSent { pact_id, .. }
            | Self::InviteCancelled { pact_id }
            | Self::InviteExpired { pact_id }
            | Self::PactAccepted { pact_id }
            | Self::PactDeclined { pact_id }
            | Self::StreakAdvanced { pact_id, .. }
            | Self::StreakBroken { pact_id, .. }
            | Self::PactEnded { pact_id, .. } => *pact_id,
        }
    }
}
