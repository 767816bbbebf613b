use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::instrument;

use shared::{
    local_date, previous_day, CommitmentType, LedgerEntry, Pact, PactEvent, PactId,
    PactParticipant, PactStatus, UserId, ValidationError,
};

use crate::collaborators::{DirectoryError, FriendshipDirectory, NotificationDispatcher};
use crate::config::EnginePolicy;
use crate::store::{PactStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot create a pact with yourself")]
    SelfPact,
    #[error("partner {0} is not in the friend directory")]
    UnknownPartner(UserId),
    #[error(transparent)]
    InvalidTarget(#[from] ValidationError),
    #[error("pact {0} not found")]
    PactNotFound(PactId),
    #[error("{user} is not a participant of pact {pact_id}")]
    NotAParticipant { pact_id: PactId, user: UserId },
    #[error("only the invited partner may respond to pact {}", .pact.id)]
    NotInvited { pact: Box<Pact> },
    #[error("only the initiator may cancel the invitation for pact {}", .pact.id)]
    NotInitiator { pact: Box<Pact> },
    #[error("pact {} has already been responded to", .pact.id)]
    AlreadyResponded { pact: Box<Pact> },
    #[error("the invitation for pact {} has expired", .pact.id)]
    InvitationExpired { pact: Box<Pact> },
    #[error("pact {} is not active", .pact.id)]
    PactInactive { pact: Box<Pact> },
    #[error("friend directory unavailable: {0}")]
    Directory(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DirectoryError> for LifecycleError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::NotFound(user) => Self::UnknownPartner(user),
            DirectoryError::Unavailable(msg) => Self::Directory(msg),
        }
    }
}

/// Owns every Pact state transition outside daily evaluation: creation,
/// the acceptance handshake, cancellation, expiry and termination. All
/// writes go through the record store's status compare-and-swap, so a lost
/// race always resolves to a state-conflict error carrying the fresh row.
pub struct LifecycleManager {
    store: Arc<dyn PactStore>,
    directory: Arc<dyn FriendshipDirectory>,
    notifier: Arc<dyn NotificationDispatcher>,
    policy: EnginePolicy,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn PactStore>,
        directory: Arc<dyn FriendshipDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            policy,
        }
    }

    #[instrument(skip(self, commitment_type))]
    pub async fn create_pact(
        &self,
        initiator: &str,
        partner: &str,
        commitment_type: CommitmentType,
        target_value: u32,
        now: DateTime<Utc>,
    ) -> Result<Pact, LifecycleError> {
        if initiator == partner {
            return Err(LifecycleError::SelfPact);
        }
        let target_value = commitment_type.validate_target(target_value)?;

        let initiator_profile = self.directory.resolve_partner(initiator).await?;
        let partner_profile = self.directory.resolve_partner(partner).await?;

        let pact = Pact::new(
            PactParticipant::new(
                initiator_profile.user_id,
                initiator_profile.utc_offset_minutes,
            ),
            PactParticipant::new(partner_profile.user_id, partner_profile.utc_offset_minutes),
            commitment_type,
            target_value,
            now,
        );
        self.store.insert_pact(&pact).await?;

        self.notifier.dispatch(PactEvent::InviteSent {
            pact_id: pact.id,
            initiator: pact.initiated_by.clone(),
            invitee: pact.invitee().user_id.clone(),
        });
        Ok(pact)
    }

    #[instrument(skip(self))]
    pub async fn respond(
        &self,
        pact_id: PactId,
        responder: &str,
        accept: bool,
        now: DateTime<Utc>,
    ) -> Result<Pact, LifecycleError> {
        let pact = self.load(pact_id).await?;

        if pact.status != PactStatus::PendingAcceptance {
            return Err(LifecycleError::AlreadyResponded {
                pact: Box::new(pact),
            });
        }
        if !pact.is_participant(responder) {
            return Err(LifecycleError::NotAParticipant {
                pact_id,
                user: responder.to_string(),
            });
        }
        if pact.invitee().user_id != responder {
            return Err(LifecycleError::NotInvited {
                pact: Box::new(pact),
            });
        }

        if now >= pact.created_at + Duration::days(self.policy.invitation_ttl_days as i64) {
            let expired = self.expire_invitation(pact).await?;
            return Err(LifecycleError::InvitationExpired {
                pact: Box::new(expired),
            });
        }

        let mut updated = pact.clone();
        updated.responded_at = Some(now);
        if accept {
            // Refresh the responder's offset snapshot; the one taken at
            // creation time may predate a move or DST change.
            let profile = self.directory.resolve_partner(responder).await?;
            if updated.participant_a.user_id == responder {
                updated.participant_a.utc_offset_minutes = profile.utc_offset_minutes;
            } else {
                updated.participant_b.utc_offset_minutes = profile.utc_offset_minutes;
            }
            updated.status = PactStatus::Active;
            updated.last_evaluated_date = Some(first_evaluable_cursor(&updated, now));
        } else {
            updated.status = PactStatus::Declined;
        }

        if !self
            .store
            .transition(&updated, PactStatus::PendingAcceptance)
            .await?
        {
            let fresh = self.load(pact_id).await?;
            return Err(LifecycleError::AlreadyResponded {
                pact: Box::new(fresh),
            });
        }

        self.notifier.dispatch(if accept {
            PactEvent::PactAccepted { pact_id }
        } else {
            PactEvent::PactDeclined { pact_id }
        });
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn cancel_invitation(
        &self,
        pact_id: PactId,
        requester: &str,
        now: DateTime<Utc>,
    ) -> Result<Pact, LifecycleError> {
        let pact = self.load(pact_id).await?;

        if pact.status != PactStatus::PendingAcceptance {
            return Err(LifecycleError::AlreadyResponded {
                pact: Box::new(pact),
            });
        }
        if pact.initiated_by != requester {
            return Err(LifecycleError::NotInitiator {
                pact: Box::new(pact),
            });
        }

        let mut updated = pact;
        updated.status = PactStatus::Declined;
        updated.responded_at = Some(now);

        if !self
            .store
            .transition(&updated, PactStatus::PendingAcceptance)
            .await?
        {
            let fresh = self.load(pact_id).await?;
            return Err(LifecycleError::AlreadyResponded {
                pact: Box::new(fresh),
            });
        }

        self.notifier.dispatch(PactEvent::InviteCancelled { pact_id });
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn end(
        &self,
        pact_id: PactId,
        requester: &str,
        mutual: bool,
        now: DateTime<Utc>,
    ) -> Result<Pact, LifecycleError> {
        let pact = self.load(pact_id).await?;

        if !pact.is_participant(requester) {
            return Err(LifecycleError::NotAParticipant {
                pact_id,
                user: requester.to_string(),
            });
        }
        if pact.status != PactStatus::Active {
            return Err(LifecycleError::PactInactive {
                pact: Box::new(pact),
            });
        }

        let mut updated = pact;
        updated.status = if mutual {
            PactStatus::EndedByMutualAgreement
        } else {
            PactStatus::EndedUnilaterally
        };

        if !self.store.transition(&updated, PactStatus::Active).await? {
            let fresh = self.load(pact_id).await?;
            return Err(LifecycleError::PactInactive {
                pact: Box::new(fresh),
            });
        }

        self.notifier.dispatch(PactEvent::PactEnded {
            pact_id,
            status: updated.status,
        });
        Ok(updated)
    }

    /// Read-only snapshot for the presentation layer.
    pub async fn current_state(&self, pact_id: PactId) -> Result<Pact, LifecycleError> {
        self.load(pact_id).await
    }

    /// Most-recent-first ledger page; `before` restarts the walk at an
    /// older cursor.
    pub async fn ledger_history(
        &self,
        pact_id: PactId,
        before: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, LifecycleError> {
        self.load(pact_id).await?;
        Ok(self.store.ledger_history(pact_id, before, limit).await?)
    }

    /// Flips a stale invitation to declined; shared by `respond` and the
    /// sweep-driven expiry pass.
    pub(crate) async fn expire_invitation(&self, pact: Pact) -> Result<Pact, LifecycleError> {
        let mut updated = pact;
        updated.status = PactStatus::Declined;

        if self
            .store
            .transition(&updated, PactStatus::PendingAcceptance)
            .await?
        {
            self.notifier
                .dispatch(PactEvent::InviteExpired { pact_id: updated.id });
            Ok(updated)
        } else {
            self.load(updated.id).await
        }
    }

    async fn load(&self, pact_id: PactId) -> Result<Pact, LifecycleError> {
        self.store
            .pact(pact_id)
            .await?
            .ok_or(LifecycleError::PactNotFound(pact_id))
    }
}

/// The cursor an accepted Pact starts evaluating from: the later of the two
/// participants' local "yesterday", so each side's current local day is the
/// first one on the hook.
fn first_evaluable_cursor(pact: &Pact, now: DateTime<Utc>) -> NaiveDate {
    let today_a = local_date(now, pact.participant_a.utc_offset_minutes);
    let today_b = local_date(now, pact.participant_b.utc_offset_minutes);
    previous_day(today_a.max(today_b))
}
