use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared::{CommitmentType, PactEvent, UserId};

pub mod http;

pub use http::{HttpFriendshipDirectory, HttpTelemetrySource, WebhookDispatcher};

/// Profile the friend directory resolves a user id to. The offset snapshot
/// is what pins the user's local day boundary inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user {0} not found in the friend directory")]
    NotFound(UserId),
    #[error("friend directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The source cannot answer right now. This is never a miss; the day
    /// stays "not yet reported" until the grace deadline settles it.
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),
}

/// Resolves partner identities. Friend matching itself lives elsewhere; the
/// engine only ever asks whether a user exists and what their profile says.
#[async_trait]
pub trait FriendshipDirectory: Send + Sync {
    async fn resolve_partner(&self, user_id: &str) -> Result<UserProfile, DirectoryError>;
}

/// Per-user daily progress counts from the task/focus tracker, keyed by the
/// user's own local calendar date.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn daily_progress(
        &self,
        user_id: &str,
        commitment_type: &CommitmentType,
        local_date: NaiveDate,
    ) -> Result<u32, TelemetryError>;
}

/// Downstream consumer of engine events. Dispatch must never block or fail
/// the operation that produced the event.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: PactEvent);
}

/// Fallback dispatcher: events land in the log and nowhere else.
#[derive(Debug, Default, Clone)]
pub struct TracingDispatcher;

impl NotificationDispatcher for TracingDispatcher {
    fn dispatch(&self, event: PactEvent) {
        tracing::info!(pact_id = %event.pact_id(), "pact event: {event:?}");
    }
}
