use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;

use shared::{CommitmentType, PactEvent};

use super::{
    DirectoryError, FriendshipDirectory, NotificationDispatcher, TelemetryError, TelemetrySource,
    UserProfile,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> anyhow::Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

pub struct HttpFriendshipDirectory {
    client: Client,
    base_url: String,
}

impl HttpFriendshipDirectory {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: client()?,
            base_url,
        })
    }
}

#[async_trait]
impl FriendshipDirectory for HttpFriendshipDirectory {
    async fn resolve_partner(&self, user_id: &str) -> Result<UserProfile, DirectoryError> {
        let url = format!("{}/api/friends/{user_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(user_id.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    progress: u32,
}

pub struct HttpTelemetrySource {
    client: Client,
    base_url: String,
}

impl HttpTelemetrySource {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: client()?,
            base_url,
        })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn daily_progress(
        &self,
        user_id: &str,
        commitment_type: &CommitmentType,
        local_date: NaiveDate,
    ) -> Result<u32, TelemetryError> {
        let url = format!(
            "{}/api/telemetry/{user_id}/{}/{local_date}",
            self.base_url,
            commitment_type.kind_label()
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TelemetryError::Unavailable(e.to_string()))?;

        response
            .json::<ProgressResponse>()
            .await
            .map(|r| r.progress)
            .map_err(|e| TelemetryError::Unavailable(e.to_string()))
    }
}

/// Posts engine events to a webhook from a background task. The producing
/// side only pushes onto a channel, so a slow or dead consumer never backs
/// up into lifecycle or evaluation paths.
pub struct WebhookDispatcher {
    sender: mpsc::UnboundedSender<PactEvent>,
}

async fn sender_task(
    mut receiver: mpsc::UnboundedReceiver<PactEvent>,
    client: Client,
    webhook_url: String,
) {
    while let Some(event) = receiver.recv().await {
        match client.post(&webhook_url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!("event webhook returned HTTP {}", response.status());
            }
            Err(e) => tracing::warn!("failed to deliver event webhook: {e}"),
        }
    }
}

impl WebhookDispatcher {
    pub fn new(webhook_url: String) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(sender_task(receiver, client()?, webhook_url));
        Ok(Self { sender })
    }
}

impl NotificationDispatcher for WebhookDispatcher {
    fn dispatch(&self, event: PactEvent) {
        let _ = self.sender.send(event);
    }
}
